#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(
        "Did not find any embeddings in storage. \
         A plausible cause is that they have not been computed yet"
    )]
    Empty,

    #[error("Title {0} is not in the index")]
    UnknownTitle(i64),

    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index codec error: {0}")]
    Codec(#[from] bincode::Error),
}
