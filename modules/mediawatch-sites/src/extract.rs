use scraper::{ElementRef, Html, Selector};

use crate::article::{FeaturedArticle, MainArticle, TopArticle};
use crate::error::ParseError;

/// Which extractor handles a site's front page. Parser dispatch is tagged
/// data: each variant maps to one pure function over the raw HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    LeMonde,
    FranceTvInfo,
    CNews,
    BfmTv,
    LeParisien,
    LeFigaro,
    Tf1Info,
}

/// What an extractor pulls out of one capture body.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub main_article: MainArticle,
    pub top_articles: Vec<TopArticle>,
}

impl ExtractorKind {
    pub fn parse(self, html: &str) -> Result<ExtractedPage, ParseError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        match self {
            ExtractorKind::LeMonde => le_monde(root),
            ExtractorKind::FranceTvInfo => france_tv_info(root),
            ExtractorKind::CNews => cnews(root),
            ExtractorKind::BfmTv => bfmtv(root),
            ExtractorKind::LeParisien => le_parisien(root),
            ExtractorKind::LeFigaro => le_figaro(root),
            ExtractorKind::Tf1Info => tf1_info(root),
        }
    }
}

fn le_monde(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, article) in select_all(root, "div.top-article").enumerate() {
        let link = select_unique(article, "a")?;
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(article), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    let main = select_unique(root, "div.article--main")?;
    let title = select_unique(main, "p.article__title-label")?;
    let link = select_first(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
        },
        top_articles,
    })
}

fn france_tv_info(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, article) in select_all(root, "article.card-article-most-read").enumerate() {
        let title = select_unique(article, "p.card-article-most-read__title")?;
        let link = select_unique(article, "a")?;
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    // The main card class changed over the archive's history; accept both.
    let main = select_first_of(
        root,
        &["article.card-article-majeure", "article.card-article-actu-forte"],
    )?;
    let title = select_first_of(
        main,
        &[".card-article-majeure__title", ".card-article-actu-forte__title"],
    )?;
    let link = select_first(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
        },
        top_articles,
    })
}

fn cnews(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, link) in select_all(root, ".top-news-content a").enumerate() {
        let title = select_unique(link, "h3.dm-letop-title")?;
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    let main = select_first(root, "div.dm-block")?;
    let title = select_unique(main, "h2.dm-news-title")?;
    let link = select_unique(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
        },
        top_articles,
    })
}

fn bfmtv(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, link) in select_all(root, "section[id*='top_contenus'] li > a").enumerate() {
        let title = select_unique(link, "h3")?;
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    let main = select_unique(root, "article.une_item")?;
    let title = select_unique(main, "h2.title_une_item")?;
    let link = select_first(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
        },
        top_articles,
    })
}

fn le_parisien(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, link) in select_all(root, "a[data-block-name='Les_plus_lus']").enumerate() {
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(link), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    let main = select_first(root, ".homepage__top article")?;
    let link = select_first(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(link), href(link, "a")?)?,
        },
        top_articles,
    })
}

fn le_figaro(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    // Le Figaro publishes no "most read" list on its front page.
    let main = select_first(root, ".fig-main .fig-ensemble__first-article")?;
    let title = select_unique(main, ".fig-ensemble__title")?;
    let link = select_first(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(title), href(link, "a")?)?,
        },
        top_articles: Vec::new(),
    })
}

fn tf1_info(root: ElementRef) -> Result<ExtractedPage, ParseError> {
    let mut top_articles = Vec::new();
    for (idx, item) in select_all(root, "#AllNews__List__0 .AllNewsItem .LinkArticle").enumerate() {
        let link = select_unique(item, "a")?;
        top_articles.push(TopArticle {
            article: FeaturedArticle::new(&text_of(link), href(link, "a")?)?,
            rank: idx as u32 + 1,
        });
    }

    let main = select_first(root, "#headlineid .ArticleCard__Title")?;
    let link = select_unique(main, "a")?;

    Ok(ExtractedPage {
        main_article: MainArticle {
            article: FeaturedArticle::new(&text_of(link), href(link, "a")?)?,
        },
        top_articles,
    })
}

// --- selection helpers ---

fn compile(selector: &str) -> Selector {
    // Selectors are compile-time literals; a bad one is a programmer error.
    Selector::parse(selector).expect("static selector must be valid")
}

fn select_all<'a>(root: ElementRef<'a>, selector: &str) -> impl Iterator<Item = ElementRef<'a>> {
    let compiled = compile(selector);
    root.select(&compiled).collect::<Vec<_>>().into_iter()
}

fn select_first<'a>(root: ElementRef<'a>, selector: &str) -> Result<ElementRef<'a>, ParseError> {
    select_all(root, selector)
        .next()
        .ok_or_else(|| ParseError::MissingAnchor(selector.to_string()))
}

fn select_unique<'a>(root: ElementRef<'a>, selector: &str) -> Result<ElementRef<'a>, ParseError> {
    let matches: Vec<_> = select_all(root, selector).collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        many_or_zero => Err(ParseError::NotUnique {
            selector: selector.to_string(),
            found: many_or_zero.len(),
        }),
    }
}

/// First selector in the list that matches anything; the match must be
/// unique for that selector.
fn select_first_of<'a>(
    root: ElementRef<'a>,
    selectors: &[&str],
) -> Result<ElementRef<'a>, ParseError> {
    for selector in selectors {
        let matches: Vec<_> = select_all(root, selector).collect();
        match matches.as_slice() {
            [] => continue,
            [one] => return Ok(*one),
            many => {
                return Err(ParseError::NotUnique {
                    selector: selector.to_string(),
                    found: many.len(),
                })
            }
        }
    }
    Err(ParseError::MissingAnchor(selectors.join(", ")))
}

fn href<'a>(element: ElementRef<'a>, selector: &str) -> Result<&'a str, ParseError> {
    element
        .value()
        .attr("href")
        .ok_or_else(|| ParseError::MissingHref(selector.to_string()))
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LE_MONDE_FIXTURE: &str = r#"
        <html><body>
          <div class="article--main">
            <a href="/web/20240522114811/https://www.lemonde.fr/economie/article/2024/05/22/total.html">
              <p class="article__title-label">TotalEnergies, cent bougies et un feu de critiques</p>
            </a>
          </div>
          <div class="top-article">
            <a href="/web/20240522114811/https://www.lemonde.fr/b.html">Article B</a>
          </div>
          <div class="top-article">
            <a href="/web/20240522114811/https://www.lemonde.fr/c.html">Article C</a>
          </div>
        </body></html>
    "#;

    #[test]
    fn le_monde_extracts_main_and_ranked_tops() {
        let page = ExtractorKind::LeMonde.parse(LE_MONDE_FIXTURE).unwrap();

        assert_eq!(
            page.main_article.article.title,
            "TotalEnergies, cent bougies et un feu de critiques"
        );
        assert_eq!(
            page.main_article.article.original_url.as_str(),
            "https://www.lemonde.fr/economie/article/2024/05/22/total.html"
        );

        let ranks: Vec<u32> = page.top_articles.iter().map(|t| t.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(page.top_articles[0].article.title, "Article B");
        assert_eq!(page.top_articles[1].article.title, "Article C");
    }

    #[test]
    fn missing_main_anchor_is_a_parse_error() {
        let html = "<html><body><p>nothing here</p></body></html>";
        let err = ExtractorKind::LeMonde.parse(html).unwrap_err();
        assert!(matches!(err, ParseError::NotUnique { .. }));
    }

    #[test]
    fn bfmtv_top_list_requires_section_id_fragment() {
        let html = r#"
            <html><body>
              <article class="une_item">
                <a href="/web/20240522114811/https://www.bfmtv.com/une.html">
                  <h2 class="title_une_item">La une</h2>
                </a>
              </article>
              <section id="widget_top_contenus_123">
                <ul>
                  <li><a href="/web/20240522114811/https://www.bfmtv.com/top1.html"><h3>Top 1</h3></a></li>
                  <li><a href="/web/20240522114811/https://www.bfmtv.com/top2.html"><h3>Top 2</h3></a></li>
                </ul>
              </section>
            </body></html>
        "#;

        let page = ExtractorKind::BfmTv.parse(html).unwrap();
        assert_eq!(page.main_article.article.title, "La une");
        assert_eq!(page.top_articles.len(), 2);
        assert_eq!(page.top_articles[1].article.title, "Top 2");
        assert_eq!(page.top_articles[1].rank, 2);
    }

    #[test]
    fn le_figaro_has_no_top_articles() {
        let html = r#"
            <html><body>
              <div class="fig-main">
                <div class="fig-ensemble__first-article">
                  <a href="/web/20240522114811/https://www.lefigaro.fr/a.html">
                    <span class="fig-ensemble__title">Titre</span>
                  </a>
                </div>
              </div>
            </body></html>
        "#;

        let page = ExtractorKind::LeFigaro.parse(html).unwrap();
        assert_eq!(page.main_article.article.title, "Titre");
        assert!(page.top_articles.is_empty());
    }
}
