use url::Url;

use mediawatch_archive::{Snapshot, SnapshotId};

use crate::error::ParseError;
use crate::extract::ExtractorKind;

const WEB_ARCHIVE_BASE: &str = "https://web.archive.org";

/// An article as it appeared on a captured front page: headline plus the
/// archive-wrapped link and the recovered original URL.
///
/// Both URLs are guaranteed absolute with a scheme; violating that is a
/// fatal extraction error, not a recoverable condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedArticle {
    pub title: String,
    pub archive_url: Url,
    pub original_url: Url,
}

impl FeaturedArticle {
    pub fn new(title: &str, href: &str) -> Result<Self, ParseError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ParseError::EmptyText(href.to_string()));
        }

        let archive_url = clean_web_archive_url(href)?;
        let original_url = extract_original_url(&archive_url)?;

        Ok(Self {
            title: title.to_string(),
            archive_url,
            original_url,
        })
    }
}

/// The single article a site visually elevates above all others.
#[derive(Debug, Clone, PartialEq)]
pub struct MainArticle {
    pub article: FeaturedArticle,
}

/// One entry of the ranked "top articles" list. Ranks are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct TopArticle {
    pub article: FeaturedArticle,
    pub rank: u32,
}

/// A structured view of one captured front page.
#[derive(Debug, Clone)]
pub struct FrontPage {
    pub snapshot_id: SnapshotId,
    pub main_article: MainArticle,
    pub top_articles: Vec<TopArticle>,
}

impl FrontPage {
    /// Run the extractor for `kind` over a capture body.
    pub fn from_snapshot(kind: ExtractorKind, snapshot: &Snapshot) -> Result<Self, ParseError> {
        let extracted = kind.parse(&snapshot.text)?;
        Ok(Self {
            snapshot_id: snapshot.id.clone(),
            main_article: extracted.main_article,
            top_articles: extracted.top_articles,
        })
    }
}

/// Normalise an href found in an archived page into an absolute archive
/// URL. Captured pages link relatively (`/web/<ts>/<url>`) or without a
/// scheme; both resolve against the archive host.
fn clean_web_archive_url(href: &str) -> Result<Url, ParseError> {
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(WEB_ARCHIVE_BASE)
            .and_then(|base| base.join(href))
            .map_err(|_| ParseError::InvalidUrl(href.to_string())),
        Err(_) => Err(ParseError::InvalidUrl(href.to_string())),
    }
}

/// Recover the original URL from an archive-wrapped one, e.g.
/// `https://web.archive.org/web/20240522114811/https://www.lemonde.fr/a`
/// yields `https://www.lemonde.fr/a`.
fn extract_original_url(archive_url: &Url) -> Result<Url, ParseError> {
    let stripped = archive_url.path().splitn(4, '/').last().unwrap_or_default();
    Url::parse(stripped).map_err(|_| ParseError::InvalidUrl(stripped.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_archive_href_is_resolved_and_stripped() {
        let article = FeaturedArticle::new(
            "TotalEnergies, cent bougies",
            "/web/20240522114811/https://www.lemonde.fr/economie/article/2024/05/22/total.html",
        )
        .unwrap();

        assert_eq!(
            article.archive_url.as_str(),
            "https://web.archive.org/web/20240522114811/https://www.lemonde.fr/economie/article/2024/05/22/total.html"
        );
        assert_eq!(
            article.original_url.as_str(),
            "https://www.lemonde.fr/economie/article/2024/05/22/total.html"
        );
    }

    #[test]
    fn absolute_archive_href_is_kept() {
        let article = FeaturedArticle::new(
            "Une",
            "https://web.archive.org/web/20240522114811/https://www.lemonde.fr/a",
        )
        .unwrap();
        assert_eq!(article.original_url.as_str(), "https://www.lemonde.fr/a");
    }

    #[test]
    fn unwrapped_href_is_a_fatal_error() {
        // No /web/<ts>/ wrapping: the "original" part is not absolute.
        let err = FeaturedArticle::new("Une", "https://example.com/plain").unwrap_err();
        assert!(matches!(err, ParseError::InvalidUrl(_)));
    }

    #[test]
    fn empty_title_is_rejected() {
        let err = FeaturedArticle::new(
            "   ",
            "/web/20240522114811/https://www.lemonde.fr/a",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::EmptyText(_)));
    }
}
