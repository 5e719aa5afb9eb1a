//! Record schemas for everything the crawlers extract.
//!
//! This module defines the five record kinds persisted by the pipeline:
//! - [`Article`]: news stories and informational pages
//! - [`Event`]: parades, parties, comparsas
//! - [`Business`]: hotels, restaurants, transport
//! - [`Product`]: merchandise, crafts, costumes
//! - [`Plan`]: tourism plans and packages
//!
//! Every kind shares `url` (dedup and upsert key), `source` and `scraped_at`.
//! Records serialize flat, with the fields declared on their kind and absent
//! optional values written as `null`, so the same JSON object is used for the
//! local JSON-lines file and for the remote upsert row.

use crate::error::InvalidRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five record kinds, each bound to one destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Article,
    Event,
    Business,
    Product,
    Plan,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Article,
        RecordKind::Event,
        RecordKind::Business,
        RecordKind::Product,
        RecordKind::Plan,
    ];

    /// Remote table that rows of this kind are upserted into.
    pub fn table(self) -> &'static str {
        match self {
            RecordKind::Article => "articles",
            RecordKind::Event => "events",
            RecordKind::Business => "businesses",
            RecordKind::Product => "products",
            RecordKind::Plan => "plans",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Article => "article",
            RecordKind::Event => "event",
            RecordKind::Business => "business",
            RecordKind::Product => "product",
            RecordKind::Plan => "plan",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform field access across record kinds.
///
/// Pipeline stages only see records through this trait, so adding a field to
/// a kind never requires touching a stage.
pub trait RecordFields {
    fn kind(&self) -> RecordKind;
    fn url(&self) -> &str;
    /// The title or name, whichever the kind uses as its headline.
    fn primary_title(&self) -> &str;
    fn scraped_at(&self) -> Option<&str>;
    fn scraped_at_mut(&mut self) -> &mut Option<String>;
    /// Mandatory text fields: the headline, `url` and `source`.
    fn required_text_mut(&mut self) -> Vec<&mut String>;
    fn optional_text_mut(&mut self) -> Vec<&mut Option<String>>;
    fn text_lists_mut(&mut self) -> Vec<&mut Vec<String>>;
}

macro_rules! record_kind {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:ident) {
            primary: $primary:ident,
            text: [$($text:ident),* $(,)?],
            numeric: [$($num:ident: $num_ty:ty),* $(,)?],
            lists: [$($list:ident),* $(,)?] $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub $primary: String,
            pub url: String,
            pub source: String,
            $(
                #[serde(default)]
                pub $text: Option<String>,
            )*
            $(
                #[serde(default)]
                pub $num: Option<$num_ty>,
            )*
            $(
                #[serde(default)]
                pub $list: Vec<String>,
            )*
            #[serde(default)]
            pub scraped_at: Option<String>,
        }

        impl RecordFields for $name {
            fn kind(&self) -> RecordKind {
                RecordKind::$kind
            }

            fn url(&self) -> &str {
                &self.url
            }

            fn primary_title(&self) -> &str {
                &self.$primary
            }

            fn scraped_at(&self) -> Option<&str> {
                self.scraped_at.as_deref()
            }

            fn scraped_at_mut(&mut self) -> &mut Option<String> {
                &mut self.scraped_at
            }

            fn required_text_mut(&mut self) -> Vec<&mut String> {
                vec![&mut self.$primary, &mut self.url, &mut self.source]
            }

            fn optional_text_mut(&mut self) -> Vec<&mut Option<String>> {
                vec![$(&mut self.$text),*]
            }

            fn text_lists_mut(&mut self) -> Vec<&mut Vec<String>> {
                vec![$(&mut self.$list),*]
            }
        }

        impl From<$name> for Record {
            fn from(value: $name) -> Self {
                Record::$kind(value)
            }
        }
    };
}

record_kind! {
    /// A news story or informational page about the Carnival.
    Article (Article) {
        primary: title,
        text: [author, published_at, summary, content, image_url, category],
        numeric: [],
        lists: [tags],
    }
}

record_kind! {
    /// A scheduled Carnival event: parade, party, comparsa.
    Event (Event) {
        primary: title,
        text: [description, event_date, event_time, location, address, image_url, category, price],
        numeric: [latitude: f64, longitude: f64],
        lists: [],
    }
}

record_kind! {
    /// A business or service: hotel, restaurant, transport.
    Business (Business) {
        primary: name,
        text: [
            description, category, address, phone, email, website,
            image_url, opening_hours, price_range,
        ],
        numeric: [latitude: f64, longitude: f64, rating: f64, review_count: i64],
        lists: [],
    }
}

record_kind! {
    /// A product for sale: merchandise, crafts, costumes.
    Product (Product) {
        primary: name,
        text: [description, price, currency, image_url, category, seller, availability],
        numeric: [],
        lists: [],
    }
}

record_kind! {
    /// A tourism plan or package.
    Plan (Plan) {
        primary: title,
        text: [description, price, currency, duration, image_url, provider, category],
        numeric: [],
        lists: [includes],
    }
}

/// One extracted record of any kind.
///
/// Serializes as the bare kind struct; the kind itself is carried by the
/// destination (table or run file), not by an extra field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Article(Article),
    Event(Event),
    Business(Business),
    Product(Product),
    Plan(Plan),
}

impl Record {
    pub fn fields(&self) -> &dyn RecordFields {
        match self {
            Record::Article(r) => r,
            Record::Event(r) => r,
            Record::Business(r) => r,
            Record::Product(r) => r,
            Record::Plan(r) => r,
        }
    }

    pub fn fields_mut(&mut self) -> &mut dyn RecordFields {
        match self {
            Record::Article(r) => r,
            Record::Event(r) => r,
            Record::Business(r) => r,
            Record::Product(r) => r,
            Record::Plan(r) => r,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.fields().kind()
    }

    pub fn url(&self) -> &str {
        self.fields().url()
    }

    pub fn primary_title(&self) -> &str {
        self.fields().primary_title()
    }

    pub fn scraped_at(&self) -> Option<&str> {
        self.fields().scraped_at()
    }

    /// Check the emission invariants: a non-blank `url` and headline.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if self.url().trim().is_empty() {
            return Err(InvalidRecord::MissingUrl);
        }
        if self.primary_title().trim().is_empty() {
            return Err(InvalidRecord::EmptyTitle {
                url: self.url().to_string(),
            });
        }
        Ok(())
    }

    /// The record as a flat JSON object, ready for a sink.
    pub fn to_row(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
