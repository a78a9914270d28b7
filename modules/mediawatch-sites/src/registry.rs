use chrono_tz::Tz;

use crate::extract::ExtractorKind;

/// One observed news source: stable short name, canonical URL, the time
/// zone its front page lives in, and the extractor that understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    pub name: &'static str,
    pub url: &'static str,
    pub tz: Tz,
    pub extractor: ExtractorKind,
}

/// The fixed collection of observed sites.
pub fn site_collection() -> Vec<SiteSpec> {
    vec![
        SiteSpec {
            name: "le_monde",
            url: "https://lemonde.fr",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::LeMonde,
        },
        SiteSpec {
            name: "france_tv_info",
            url: "https://francetvinfo.fr",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::FranceTvInfo,
        },
        SiteSpec {
            name: "cnews",
            url: "https://cnews.fr",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::CNews,
        },
        SiteSpec {
            name: "bfmtv",
            url: "https://bfmtv.com",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::BfmTv,
        },
        SiteSpec {
            name: "le_parisien",
            url: "https://www.leparisien.fr/",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::LeParisien,
        },
        SiteSpec {
            name: "le_figaro",
            url: "https://www.lefigaro.fr/",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::LeFigaro,
        },
        SiteSpec {
            name: "tf1_info",
            url: "https://www.tf1info.fr/",
            tz: chrono_tz::Europe::Paris,
            extractor: ExtractorKind::Tf1Info,
        },
    ]
}
