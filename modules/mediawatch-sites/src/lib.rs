pub mod article;
pub mod error;
pub mod extract;
pub mod registry;

pub use article::{FeaturedArticle, FrontPage, MainArticle, TopArticle};
pub use error::ParseError;
pub use extract::{ExtractedPage, ExtractorKind};
pub use registry::{site_collection, SiteSpec};
