use chrono::{DateTime, FixedOffset};

/// A news source row.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRow {
    pub id: i64,
    pub name: String,
    pub original_url: String,
}

/// A headline row, separated from the article so a changed headline on
/// the same URL creates a new title.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRow {
    pub id: i64,
    pub text: String,
}

/// One appearance of an article on a captured front page, either as the
/// main article or in the ranked top list.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleOnFrontPage {
    pub frontpage_id: i64,
    pub site_id: i64,
    pub site_name: String,
    pub scheduled_at: DateTime<FixedOffset>,
    pub article_id: i64,
    pub title_id: i64,
    pub title: String,
    pub url_article: String,
    pub url_archive: String,
    pub is_main: bool,
    pub rank: Option<i64>,
}

/// A main article near a chosen anchor instant, with the signed distance
/// to that anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbouringMainArticle {
    pub article: ArticleOnFrontPage,
    pub time_diff_secs: i64,
}
