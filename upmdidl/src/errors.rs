use thiserror::Error;

#[derive(Debug, Error)]
pub enum DidlError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("Root element is <{0}>, expected <DIDL-Lite>")]
    NotDidl(String),
}
