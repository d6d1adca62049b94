pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no baseline data for {unit}")]
    NoBaselineData { unit: String },

    #[error("no current year data for {unit}")]
    NoCurrentData { unit: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
