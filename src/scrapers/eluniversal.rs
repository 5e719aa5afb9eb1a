//! El Universal (Cartagena) article extractor.
//!
//! Covers the Carnival from its tag page; same listing-then-detail shape as
//! El Heraldo, with lighter markup.

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

const SOURCE: &str = "El Universal";
const START_URL: &str = "https://www.eluniversal.com.co/tags/carnaval-de-barranquilla";

static STORY_LINKS: Lazy<Selector> =
    Lazy::new(|| selector("article a[href], .node-title a[href], h2 a[href]"));
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| selector("li.pager-next a[href], a[rel='next']"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector(".author"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("article p, .article-body p"));
static TAGS: Lazy<Selector> = Lazy::new(|| selector(".tags a"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ElUniversal;

impl Extractor for ElUniversal {
    fn name(&self) -> &'static str {
        "eluniversal"
    }

    fn allowed_domains(&self) -> &'static [&'static str] {
        &["eluniversal.com.co"]
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
                debug!(callback = %other, "No El Universal handler for callback");
                Extraction::new()
            }
        }
    }
}

#[instrument(level = "info", skip_all, fields(url = %page.url))]
fn parse_article(page: &Page) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    let Some(title) = first(&doc, &[(&*H1, Pick::Text)]) else {
        debug!("Article page has no title; skipping");
        return out;
    };

    out.emit(Article {
        title,
        url: page.url.to_string(),
        source: SOURCE.to_string(),
        author: first(
            &doc,
            &[(&*META_AUTHOR, Pick::Attr("content")), (&*AUTHOR, Pick::Text)],
        ),
        published_at: first(
            &doc,
            &[
                (&*TIME_DATETIME, Pick::Attr("datetime")),
                (&*META_PUBLISHED, Pick::Attr("content")),
            ],
        ),
        summary: first(&doc, &[(&*OG_DESCRIPTION, Pick::Attr("content"))]),
        content: paragraphs(&doc, &BODY),
        image_url: first(&doc, &[(&*OG_IMAGE, Pick::Attr("content"))]),
        category: Some("noticias".to_string()),
        tags: all(&doc, &TAGS, Pick::Text).into_iter().unique().collect(),
        scraped_at: None,
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::scrapers::test_support::page;

    #[test]
    fn test_listing_follows_rel_next() {
        let body = r#"
            <h2><a href="/cultura/el-carnaval-en-cartagena">Nota</a></h2>
            <a rel="next" href="/tags/carnaval-de-barranquilla?page=2">Más</a>"#;
        let p = page("eluniversal", START_URL, Callback::Listing, body);
        let out = ElUniversal.parse(&p);

        let callbacks: Vec<Callback> = out.requests().iter().map(|r| r.callback).collect();
        assert_eq!(callbacks, vec![Callback::Article, Callback::Listing]);
        assert_eq!(
            out.requests()[0].url.as_str(),
            "https://www.eluniversal.com.co/cultura/el-carnaval-en-cartagena"
        );
    }

    #[test]
    fn test_article_prefers_meta_author() {
        let body = r#"
            <html><head><meta name="author" content="Juan Pérez"></head>
            <body><h1>Cartagena se prepara para el Carnaval</h1>
              <span class="author">Otro</span>
              <article><p>Texto.</p></article>
            </body></html>"#;
        let url = "https://www.eluniversal.com.co/cultura/nota";
        let out = ElUniversal.parse(&page("eluniversal", url, Callback::Article, body));

        let Record::Article(article) = &out.records()[0] else {
            panic!("expected an article");
        };
        assert_eq!(article.author.as_deref(), Some("Juan Pérez"));
        assert_eq!(article.source, "El Universal");
        assert_eq!(article.content.as_deref(), Some("Texto."));
        assert!(article.tags.is_empty());
    }
}
