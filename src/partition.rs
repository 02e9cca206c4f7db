use crate::season::Season;
use std::fmt;

/// One independent unit of conversion work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub region: String,
    pub season: Season,
    pub state: String,
}

impl PartitionKey {
    pub fn new(region: impl Into<String>, season: Season, state: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            season,
            state: state.into(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.region, self.season, self.state)
    }
}
