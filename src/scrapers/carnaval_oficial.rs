//! Official Carnaval de Barranquilla site extractor.
//!
//! The primary source for events and programming. The home page links to
//! programming/agenda listings (events) and to news/history pages, which are
//! stored as articles. A listing page with no recognizable event entries is
//! treated as a single event page.

use crate::fetch::{Callback, FetchRequest, Page};
use crate::models::{Article, Event};
use crate::scrapers::{
    Extraction, Extractor, H1, OG_DESCRIPTION, OG_IMAGE, Pick, TIME_DATETIME, first, follow_all,
    paragraphs, selector,
};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

const SOURCE: &str = "Carnaval de Barranquilla (Oficial)";
const START_URL: &str = "https://www.carnavaldebarranquilla.org";

static EVENT_LINKS: Lazy<Selector> = Lazy::new(|| {
    selector(
        "a[href*='programacion'], a[href*='evento'], a[href*='agenda'], a[href*='calendario']",
    )
});
static CONTENT_LINKS: Lazy<Selector> =
    Lazy::new(|| selector("a[href*='noticia'], a[href*='historia']"));
static EVENT_ENTRIES: Lazy<Selector> = Lazy::new(|| selector("article, .event-item, .evento"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static EVENT_TITLE: Lazy<Selector> = Lazy::new(|| selector("h2.event-title"));
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| selector(".event-description, .description p"));
static DATE: Lazy<Selector> = Lazy::new(|| selector(".event-date, .fecha"));
static TIME: Lazy<Selector> = Lazy::new(|| selector(".event-time, .hora"));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector(".event-location, .lugar, .ubicacion"));
static ADDRESS: Lazy<Selector> = Lazy::new(|| selector(".event-address, .direccion"));
static PRICE: Lazy<Selector> = Lazy::new(|| selector(".event-price, .precio"));
static CONTENT_BODY: Lazy<Selector> = Lazy::new(|| selector("article p, .content p"));

#[derive(Debug, Clone, Copy, Default)]
pub struct CarnavalOficial;

impl Extractor for CarnavalOficial {
    fn name(&self) -> &'static str {
        "carnaval_oficial"
    }

    fn allowed_domains(&self) -> &'static [&'static str] {
        &["carnavaldebarranquilla.org"]
    }

    fn seeds(&self) -> Vec<FetchRequest> {
        Url::parse(START_URL)
            .map(|url| vec![FetchRequest::seed(self.name(), url, Callback::Listing)])
            .unwrap_or_default()
    }

    fn parse(&self, page: &Page) -> Extraction {
        match page.request.callback {
            Callback::Listing => parse_home(page),
            Callback::EventListing => parse_event_listing(page),
            Callback::Event => parse_event(page, &Html::parse_document(&page.body)),
            Callback::Content => parse_content(page),
            Callback::Article => {
                debug!("Official site has no article callback");
                Extraction::new()
            }
        }
    }
}

#[instrument(level = "info", skip_all, fields(url = %page.url))]
fn parse_home(page: &Page) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    for request in follow_all(page, &doc, &EVENT_LINKS, Callback::EventListing) {
        out.follow(Some(request));
    }
    for request in follow_all(page, &doc, &CONTENT_LINKS, Callback::Content) {
        out.follow(Some(request));
    }

    info!(links = out.requests().len(), "Indexed official site home");
    out
}

#[instrument(level = "info", skip_all, fields(url = %page.url))]
fn parse_event_listing(page: &Page) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    let entries: Vec<_> = doc.select(&EVENT_ENTRIES).collect();
    if entries.is_empty() {
        debug!("No event entries; parsing listing as a single event");
        return parse_event(page, &doc);
    }

    for entry in entries {
        let href = entry
            .select(&ANCHOR)
            .find_map(|a| a.value().attr("href"));
        out.follow(href.and_then(|h| page.follow(h, Callback::Event)));
    }

    info!(events = out.requests().len(), "Indexed event listing");
    out
}

fn parse_event(page: &Page, doc: &Html) -> Extraction {
    let mut out = Extraction::new();

    let Some(title) = first(doc, &[(&*H1, Pick::Text), (&*EVENT_TITLE, Pick::Text)]) else {
        debug!(url = %page.url, "Event page has no title; skipping");
        return out;
    };

    out.emit(Event {
        title,
        url: page.url.to_string(),
        source: SOURCE.to_string(),
        description: first(
            doc,
            &[
                (&*OG_DESCRIPTION, Pick::Attr("content")),
                (&*DESCRIPTION, Pick::Text),
            ],
        ),
        event_date: first(
            doc,
            &[(&*DATE, Pick::Text), (&*TIME_DATETIME, Pick::Attr("datetime"))],
        ),
        event_time: first(doc, &[(&*TIME, Pick::Text)]),
        location: first(doc, &[(&*LOCATION, Pick::Text)]),
        address: first(doc, &[(&*ADDRESS, Pick::Text)]),
        image_url: first(doc, &[(&*OG_IMAGE, Pick::Attr("content"))]),
        category: Some("eventos".to_string()),
        price: first(doc, &[(&*PRICE, Pick::Text)]),
        ..Default::default()
    });
    out
}

#[instrument(level = "info", skip_all, fields(url = %page.url))]
fn parse_content(page: &Page) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    let Some(title) = first(&doc, &[(&*H1, Pick::Text)]) else {
        debug!("Content page has no title; skipping");
        return out;
    };

    out.emit(Article {
        title,
        url: page.url.to_string(),
        source: SOURCE.to_string(),
        summary: first(&doc, &[(&*OG_DESCRIPTION, Pick::Attr("content"))]),
        content: paragraphs(&doc, &CONTENT_BODY),
        image_url: first(&doc, &[(&*OG_IMAGE, Pick::Attr("content"))]),
        category: Some("cultura".to_string()),
        tags: vec!["carnaval".to_string(), "oficial".to_string()],
        ..Default::default()
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, RecordKind};
    use crate::scrapers::test_support::page;

    #[test]
    fn test_home_splits_event_and_content_links() {
        let body = r#"
            <nav>
              <a href="/programacion-2025">Programación</a>
              <a href="/agenda">Agenda</a>
              <a href="/historia-del-carnaval">Historia</a>
              <a href="/contacto">Contacto</a>
            </nav>"#;
        let out = CarnavalOficial.parse(&page("carnaval_oficial", START_URL, Callback::Listing, body));

        let callbacks: Vec<Callback> = out.requests().iter().map(|r| r.callback).collect();
        assert_eq!(
            callbacks,
            vec![Callback::EventListing, Callback::EventListing, Callback::Content]
        );
    }

    #[test]
    fn test_listing_follows_each_entry() {
        let body = r#"
            <div class="evento"><a href="/eventos/batalla-de-flores">Batalla de Flores</a></div>
            <div class="evento"><a href="/eventos/gran-parada">Gran Parada</a></div>
            <div class="evento"><span>Sin enlace</span></div>"#;
        let url = "https://www.carnavaldebarranquilla.org/programacion-2025";
        let out = CarnavalOficial.parse(&page("carnaval_oficial", url, Callback::EventListing, body));

        assert_eq!(out.requests().len(), 2);
        assert!(out.requests().iter().all(|r| r.callback == Callback::Event));
        assert!(out.records().is_empty());
    }

    #[test]
    fn test_listing_without_entries_is_a_single_event() {
        let body = r#"
            <html><head><meta property="og:description" content="Desfile inaugural"></head>
            <body><h1>Batalla de Flores</h1>
              <span class="fecha">1 de marzo</span><span class="hora">10:00 a.m.</span>
              <span class="lugar">Vía 40</span><span class="precio">$150.000</span>
            </body></html>"#;
        let url = "https://www.carnavaldebarranquilla.org/agenda";
        let out = CarnavalOficial.parse(&page("carnaval_oficial", url, Callback::EventListing, body));

        assert_eq!(out.records().len(), 1);
        let Record::Event(event) = &out.records()[0] else {
            panic!("expected an event");
        };
        assert_eq!(event.title, "Batalla de Flores");
        assert_eq!(event.event_date.as_deref(), Some("1 de marzo"));
        assert_eq!(event.event_time.as_deref(), Some("10:00 a.m."));
        assert_eq!(event.location.as_deref(), Some("Vía 40"));
        assert_eq!(event.price.as_deref(), Some("$150.000"));
        assert_eq!(event.description.as_deref(), Some("Desfile inaugural"));
        assert_eq!(event.category.as_deref(), Some("eventos"));
    }

    #[test]
    fn test_content_page_becomes_article() {
        let body = r#"<h1>Historia del Carnaval</h1><div class="content"><p>Desde 1888.</p></div>"#;
        let url = "https://www.carnavaldebarranquilla.org/historia-del-carnaval";
        let out = CarnavalOficial.parse(&page("carnaval_oficial", url, Callback::Content, body));

        assert_eq!(out.records()[0].kind(), RecordKind::Article);
        let Record::Article(article) = &out.records()[0] else {
            panic!("expected an article");
        };
        assert_eq!(article.content.as_deref(), Some("Desde 1888."));
        assert_eq!(article.tags, vec!["carnaval", "oficial"]);
        assert_eq!(article.category.as_deref(), Some("cultura"));
    }
}
