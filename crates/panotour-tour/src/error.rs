use thiserror::Error;

#[derive(Debug, Error)]
pub enum TourError {
    #[error("XML syntax error at byte {position}: {source}")]
    Syntax {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed tour document: {0}")]
    Malformed(String),

    #[error("tour document has no root element")]
    MissingRoot,

    #[error("tour document root is `{found}`, expected `krpano`")]
    UnexpectedRoot { found: String },

    #[error("character U+{code:04X} is not allowed in an XML document")]
    IllegalChar { code: u32 },

    #[error("failed to write tour XML: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("serialized tour document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
