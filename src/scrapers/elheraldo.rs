//! El Heraldo article extractor.
//!
//! El Heraldo is Barranquilla's main newspaper. The crawl starts at its
//! Carnival tag page, follows every story link, and walks the listing's
//! pagination until it runs out.

use crate::fetch::{Callback, FetchRequest, Page};
use crate::models::Article;
use crate::scrapers::{
    Extraction, Extractor, H1, META_AUTHOR, META_PUBLISHED, OG_DESCRIPTION, OG_IMAGE, Pick,
    TIME_DATETIME, all, first, paragraphs, parse_tag_listing, selector,
};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

const SOURCE: &str = "El Heraldo";
const START_URL: &str = "https://www.elheraldo.co/tags/carnaval-de-barranquilla";

static STORY_LINKS: Lazy<Selector> =
    Lazy::new(|| selector("article a[href], .node-title a[href], .views-row a[href]"));
static NEXT_PAGE: Lazy<Selector> =
    Lazy::new(|| selector("li.pager-next a[href], a.pager__link--next[href]"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h1.node-title, h1.article-title"));
static AUTHOR: Lazy<Selector> =
    Lazy::new(|| selector(".field-name-field-autor a, .author-name, span.byline"));
static DATE_TEXT: Lazy<Selector> = Lazy::new(|| selector("span.date"));
static META_DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector("meta[name='description']"));
static BODY: Lazy<Selector> = Lazy::new(|| {
    selector(".field-name-body p, .article-body p, .node-content p, article p")
});
static INLINE_IMAGE: Lazy<Selector> =
    Lazy::new(|| selector(".field-name-field-imagen img[src], article img[src]"));
static TAGS: Lazy<Selector> = Lazy::new(|| selector(".field-name-field-tags a, .tags a"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ElHeraldo;

impl Extractor for ElHeraldo {
    fn name(&self) -> &'static str {
        "elheraldo"
    }

    fn allowed_domains(&self) -> &'static [&'static str] {
        &["elheraldo.co"]
    }

    fn seeds(&self) -> Vec<FetchRequest> {
        Url::parse(START_URL)
            .map(|url| vec![FetchRequest::seed(self.name(), url, Callback::Listing)])
            .unwrap_or_default()
    }

    fn parse(&self, page: &Page) -> Extraction {
        match page.request.callback {
            Callback::Listing => parse_tag_listing(page, &STORY_LINKS, &NEXT_PAGE, SOURCE),
            Callback::Article => parse_article(page),
            other => {
                debug!(callback = %other, "No El Heraldo handler for callback");
                Extraction::new()
            }
        }
    }
}

#[instrument(level = "info", skip_all, fields(url = %page.url))]
fn parse_article(page: &Page) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    let Some(title) = first(&doc, &[(&*TITLE, Pick::Text), (&*H1, Pick::Text)]) else {
        debug!("Article page has no title; skipping");
        return out;
    };

    out.emit(Article {
        title,
        url: page.url.to_string(),
        source: SOURCE.to_string(),
        author: first(
            &doc,
            &[(&*AUTHOR, Pick::Text), (&*META_AUTHOR, Pick::Attr("content"))],
        ),
        published_at: first(
            &doc,
            &[
                (&*TIME_DATETIME, Pick::Attr("datetime")),
                (&*META_PUBLISHED, Pick::Attr("content")),
                (&*DATE_TEXT, Pick::Text),
            ],
        ),
        summary: first(
            &doc,
            &[
                (&*OG_DESCRIPTION, Pick::Attr("content")),
                (&*META_DESCRIPTION, Pick::Attr("content")),
            ],
        ),
        content: paragraphs(&doc, &BODY),
        image_url: first(
            &doc,
            &[
                (&*OG_IMAGE, Pick::Attr("content")),
                (&*INLINE_IMAGE, Pick::Attr("src")),
            ],
        ),
        category: Some("noticias".to_string()),
        tags: all(&doc, &TAGS, Pick::Text).into_iter().unique().collect(),
        scraped_at: None,
    });
    out
}
