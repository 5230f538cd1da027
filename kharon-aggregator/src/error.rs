#[derive(thiserror::Error, Debug)]
pub enum AggregatorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient I/O error on sensor '{device}': {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("all sensors inactive -- aggregator cannot produce samples")]
    AllSensorsInactive,

    #[error("malformed sensor network packet: {0}")]
    Wire(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
