pub mod error;
pub mod schema;
pub mod storage;
pub mod types;
pub mod vector;

pub use error::{Result, StoreError};
pub use storage::Storage;
pub use types::{ArticleOnFrontPage, NeighbouringMainArticle, SiteRow, TitleRow};
