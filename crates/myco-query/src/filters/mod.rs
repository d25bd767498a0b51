//! The filter catalog.
//!
//! Every filter the engine understands is a [`FilterName`]. The catalog maps
//! each name to a [`FilterSpec`]: the value [`Shape`] it accepts, the record
//! types it applies to, and the function that builds its predicate. The
//! table is built once and never changes.
//!
//! Content filters (`region`, `clade`, `lichen`, `has_images`,
//! `has_specimen`) are registered once and shared by unrelated record types.

mod common;
mod content;
mod dates;
mod geo;
mod images;
mod names;
mod observations;

use std::cell::Cell;
use std::fmt;

use once_cell::sync::Lazy;

use crate::config::EngineConfig;
use crate::context::{ContextUse, QueryContext};
use crate::error::{QueryError, Result};
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};
use crate::shape::{Scalar, Shape};
use crate::store::Directory;
use crate::value::Id;

pub use content::{canonical_region, CONTINENTS};
pub use images::{CONTENT_TYPES, IMAGE_SIZES};
pub use names::RANKS;

macro_rules! filter_names {
    ($($variant:ident => $name:literal,)*) => {
        /// Name of a registered filter.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum FilterName {
            $($variant,)*
        }

        impl FilterName {
            pub const ALL: &'static [FilterName] = &[$(FilterName::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(FilterName::$variant => $name,)*
                }
            }

            pub fn parse(name: &str) -> Option<FilterName> {
                match name {
                    $($name => Some(FilterName::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

filter_names! {
    AccessionHas => "accession_has",
    Accession => "accession",
    AccessionNumberHas => "accession_number_has",
    Archive => "archive",
    AuthorHas => "author_has",
    BodyHas => "body_has",
    ByUsers => "by_users",
    CitationHas => "citation_has",
    Clade => "clade",
    ClassificationHas => "classification_has",
    CodeHas => "code_has",
    CollectorHas => "collector_has",
    Collectors => "collectors",
    CommentsHas => "comments_has",
    Confidence => "confidence",
    ContentHas => "content_has",
    ContentTypes => "content_types",
    CopyrightHolderHas => "copyright_holder_has",
    CreatedAt => "created_at",
    Date => "date",
    Deprecated => "deprecated",
    DescriptionHas => "description_has",
    ExternalSites => "external_sites",
    FieldSlips => "field_slips",
    HasAuthor => "has_author",
    HasCitation => "has_citation",
    HasClassification => "has_classification",
    HasComments => "has_comments",
    HasContribution => "has_contribution",
    HasDefaultDescription => "has_default_description",
    HasDescriptions => "has_descriptions",
    HasImages => "has_images",
    HasName => "has_name",
    HasNotes => "has_notes",
    HasNotesFields => "has_notes_fields",
    HasObservations => "has_observations",
    HasPublicLatLng => "has_public_lat_lng",
    HasSequences => "has_sequences",
    HasSpeciesLists => "has_species_lists",
    HasSpecimen => "has_specimen",
    HasSummary => "has_summary",
    HasSynonyms => "has_synonyms",
    Herbaria => "herbaria",
    HerbariumRecords => "herbarium_records",
    IdInSet => "id_in_set",
    InBox => "in_box",
    InitialDetHas => "initial_det_has",
    IsCollectionLocation => "is_collection_location",
    IsPublic => "is_public",
    License => "license",
    Lichen => "lichen",
    Locations => "locations",
    Locus => "locus",
    LocusHas => "locus_has",
    LoginHas => "login_has",
    MailingAddressHas => "mailing_address_has",
    Members => "members",
    Misspellings => "misspellings",
    NameHas => "name_has",
    Names => "names",
    NeedsNaming => "needs_naming",
    Nonpersonal => "nonpersonal",
    NotesHas => "notes_has",
    NumberHas => "number_has",
    Numbers => "numbers",
    Observations => "observations",
    OkForExport => "ok_for_export",
    Pattern => "pattern",
    Projects => "projects",
    Quality => "quality",
    Rank => "rank",
    Region => "region",
    Size => "size",
    Sources => "sources",
    SpeciesLists => "species_lists",
    SummaryHas => "summary_has",
    Target => "target",
    TextNameHas => "text_name_has",
    TitleHas => "title_has",
    Types => "types",
    UpdatedAt => "updated_at",
    UrlHas => "url_has",
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a predicate builder may consult besides its value.
pub struct FilterCx<'a> {
    pub directory: &'a dyn Directory,
    pub context: &'a QueryContext,
    pub config: &'a EngineConfig,
    used: Cell<ContextUse>,
}

impl<'a> FilterCx<'a> {
    pub fn new(directory: &'a dyn Directory, context: &'a QueryContext, config: &'a EngineConfig) -> Self {
        Self {
            directory,
            context,
            config,
            used: Cell::new(ContextUse::default()),
        }
    }

    /// The current user. Reading it makes the compiled query depend on it.
    pub fn current_user(&self) -> Option<Id> {
        let mut used = self.used.get();
        used.current_user = true;
        self.used.set(used);
        self.context.current_user
    }

    pub(crate) fn mark_location_format(&self) {
        let mut used = self.used.get();
        used.location_format = true;
        self.used.set(used);
    }

    /// Context fields read so far.
    pub fn used(&self) -> ContextUse {
        self.used.get()
    }
}

type BuildFn = fn(&FilterCx<'_>, FilterName, RecordType, &ParamValue) -> Result<Predicate>;

/// A registered filter.
pub struct FilterSpec {
    pub name: FilterName,
    pub shape: Shape,
    pub applies_to: &'static [RecordType],
    build: BuildFn,
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("applies_to", &self.applies_to)
            .finish()
    }
}

impl FilterSpec {
    pub fn applies_to(&self, record_type: RecordType) -> bool {
        self.applies_to.contains(&record_type)
    }

    /// Builds this filter's predicate for an already-normalized value.
    ///
    /// A lookup that resolves to nothing yields an always-false predicate.
    pub fn build(&self, cx: &FilterCx<'_>, record_type: RecordType, value: &ParamValue) -> Result<Predicate> {
        match (self.build)(cx, self.name, record_type, value) {
            Err(QueryError::EmptyLookup { filter }) => {
                tracing::debug!(filter, %record_type, "lookup matched nothing");
                Ok(Predicate::False)
            }
            other => other,
        }
    }

    /// ANDs this filter's predicate onto `current`.
    pub fn apply(
        &self,
        cx: &FilterCx<'_>,
        record_type: RecordType,
        current: Predicate,
        value: &ParamValue,
    ) -> Result<Predicate> {
        let pred = self.build(cx, record_type, value)?;
        tracing::trace!(filter = %self.name, %record_type, predicate = %pred, "applied filter");
        Ok(Predicate::and([current, pred]))
    }
}

/// Registry of every filter.
#[derive(Debug)]
pub struct FilterCatalog {
    specs: Vec<FilterSpec>,
}

static CATALOG: Lazy<FilterCatalog> = Lazy::new(|| FilterCatalog {
    specs: FilterName::ALL.iter().map(|name| spec(*name)).collect(),
});

impl FilterCatalog {
    pub fn global() -> &'static FilterCatalog {
        &CATALOG
    }

    /// Finds the filter `name` for `record_type`.
    pub fn lookup(&self, record_type: RecordType, name: &str) -> Result<&FilterSpec> {
        let spec = FilterName::parse(name)
            .and_then(|parsed| self.specs.iter().find(|s| s.name == parsed))
            .ok_or_else(|| QueryError::UnknownFilter {
                record_type,
                name: name.to_string(),
            })?;
        if !spec.applies_to(record_type) {
            return Err(QueryError::NotApplicable {
                record_type,
                name: spec.name.as_str(),
            });
        }
        Ok(spec)
    }

    /// Filters registered for `record_type`.
    pub fn for_type(&self, record_type: RecordType) -> impl Iterator<Item = &FilterSpec> {
        self.specs.iter().filter(move |s| s.applies_to(record_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterSpec> {
        self.specs.iter()
    }
}

// ============================================================================
// Registry
// ============================================================================

use RecordType as T;

const ALL_TYPES: &[RecordType] = &RecordType::ALL;

const OWNED_TYPES: &[RecordType] = &[
    T::Article,
    T::CollectionNumber,
    T::Comment,
    T::ExternalLink,
    T::FieldSlip,
    T::GlossaryTerm,
    T::HerbariumRecord,
    T::Image,
    T::Location,
    T::LocationDescription,
    T::Name,
    T::NameDescription,
    T::Naming,
    T::Observation,
    T::Project,
    T::Sequence,
    T::SpeciesList,
];

const SEARCHABLE_TYPES: &[RecordType] = &[
    T::Article,
    T::CollectionNumber,
    T::Comment,
    T::ExternalLink,
    T::FieldSlip,
    T::GlossaryTerm,
    T::Herbarium,
    T::HerbariumRecord,
    T::Image,
    T::Location,
    T::LocationDescription,
    T::Name,
    T::NameDescription,
    T::Observation,
    T::Project,
    T::Sequence,
    T::SpeciesList,
    T::User,
];

const COMMENTABLE: &[RecordType] = &[T::Location, T::Name, T::Observation, T::SpeciesList];

/// Record types whose RSS log or comments can be filtered by target type.
pub const TARGET_TYPES: &[&str] = &[
    "article",
    "glossary_term",
    "location",
    "name",
    "observation",
    "project",
    "species_list",
];

const SOURCE_TYPES: &[&str] = &["foreign", "project", "public", "source", "user"];

const MISSPELLINGS: &[&str] = &["no", "either", "only"];

const TEXT: Shape = Shape::Scalar(Scalar::Text);

fn spec(name: FilterName) -> FilterSpec {
    use FilterName as F;

    let (shape, applies_to, build): (Shape, &'static [RecordType], BuildFn) = match name {
        // Shared
        F::IdInSet => (Shape::List(Scalar::Int), ALL_TYPES, common::id_in_set),
        F::ByUsers => (Shape::List(Scalar::Record), OWNED_TYPES, common::by_users),
        F::CreatedAt | F::UpdatedAt => (Shape::Range(Scalar::Time), ALL_TYPES, dates::time_range),
        F::Pattern => (TEXT, SEARCHABLE_TYPES, common::pattern),

        // Content filters
        F::Region => (
            Shape::List(Scalar::Text),
            &[T::Location, T::Observation, T::SpeciesList],
            content::region,
        ),
        F::Clade => (Shape::List(Scalar::Text), &[T::Name, T::Observation], content::clade),
        F::Lichen => (Shape::Boolean, &[T::Name, T::Observation], content::lichen),
        F::HasImages => (Shape::Boolean, &[T::Observation, T::Project], content::has_images),
        F::HasSpecimen => (Shape::Boolean, &[T::Observation], content::has_specimen),

        // Dates and places
        F::Date => (
            Shape::Range(Scalar::Date),
            &[T::Image, T::Observation, T::SpeciesList],
            dates::date_range,
        ),
        F::InBox => (Shape::Box, &[T::Location, T::Observation], geo::in_box),
        F::Locations => (
            Shape::List(Scalar::Record),
            &[T::Location, T::LocationDescription, T::Observation, T::SpeciesList],
            common::linked_records,
        ),

        // Names
        F::Names => (
            Shape::NameLookup,
            &[T::Name, T::NameDescription, T::Naming, T::Observation],
            names::names,
        ),
        F::Misspellings => (Shape::Choice(MISSPELLINGS), &[T::Name], names::misspellings),
        F::Deprecated => (Shape::Boolean, &[T::Name], common::flag),
        F::HasSynonyms => (Shape::Boolean, &[T::Name], common::presence),
        F::Rank => (Shape::ChoiceRange(RANKS), &[T::Name], names::rank),

        // Observations
        F::HasName => (Shape::Boolean, &[T::Observation], observations::has_name),
        F::NeedsNaming => (Shape::Boolean, &[T::Observation], observations::needs_naming),
        F::Confidence => (
            Shape::Range(Scalar::Float),
            &[T::Image, T::Naming, T::Observation],
            observations::confidence,
        ),
        F::HasPublicLatLng => (Shape::Boolean, &[T::Observation], observations::has_public_lat_lng),
        F::IsCollectionLocation => (Shape::Boolean, &[T::Observation], common::flag),
        F::HasNotesFields => (Shape::List(Scalar::Text), &[T::Observation], observations::has_notes_fields),
        F::Herbaria => (
            Shape::List(Scalar::Record),
            &[T::HerbariumRecord, T::Observation],
            common::linked_records,
        ),
        F::HerbariumRecords => (Shape::List(Scalar::Record), &[T::Observation], common::linked_records),
        F::FieldSlips => (Shape::List(Scalar::Record), &[T::Observation], common::linked_records),
        F::Projects => (
            Shape::List(Scalar::Record),
            &[T::FieldSlip, T::Image, T::Observation, T::SpeciesList],
            common::linked_records,
        ),
        F::SpeciesLists => (
            Shape::List(Scalar::Record),
            &[T::Name, T::Observation],
            common::linked_records,
        ),
        F::Observations => (
            Shape::List(Scalar::Int),
            &[
                T::CollectionNumber,
                T::ExternalLink,
                T::FieldSlip,
                T::HerbariumRecord,
                T::Image,
                T::Naming,
                T::Sequence,
            ],
            common::linked_records,
        ),
        F::Members => (Shape::List(Scalar::Record), &[T::Project], common::linked_records),

        // Presence
        F::HasNotes => (
            Shape::Boolean,
            &[T::HerbariumRecord, T::Image, T::Location, T::Name, T::Observation, T::SpeciesList],
            common::presence,
        ),
        F::HasAuthor | F::HasCitation | F::HasClassification | F::HasDefaultDescription => {
            (Shape::Boolean, &[T::Name], common::presence)
        }
        F::HasSummary => (Shape::Boolean, &[T::Project], common::presence),
        F::HasComments => (Shape::Boolean, COMMENTABLE, common::has_associated),
        F::HasSequences => (Shape::Boolean, &[T::Observation], common::has_associated),
        F::HasObservations => (
            Shape::Boolean,
            &[T::Image, T::Location, T::Name, T::Project],
            common::has_associated,
        ),
        F::HasSpeciesLists => (Shape::Boolean, &[T::Project], common::has_associated),
        F::HasDescriptions => (Shape::Boolean, &[T::Location, T::Name], common::has_associated),
        F::HasContribution => (Shape::Boolean, &[T::User], common::has_contribution),
        F::Nonpersonal => (Shape::Boolean, &[T::Herbarium], common::nonpersonal),
        F::OkForExport => (
            Shape::Boolean,
            &[T::Image, T::Name, T::NameDescription],
            common::flag,
        ),
        F::IsPublic => (
            Shape::Boolean,
            &[T::LocationDescription, T::NameDescription],
            common::flag,
        ),

        // Substring search on one field
        F::NotesHas => (
            TEXT,
            &[
                T::HerbariumRecord,
                T::Image,
                T::Location,
                T::Name,
                T::Observation,
                T::Sequence,
                T::SpeciesList,
            ],
            common::field_has,
        ),
        F::CommentsHas => (TEXT, COMMENTABLE, common::comments_has),
        F::ContentHas => (
            TEXT,
            &[T::Comment, T::LocationDescription, T::NameDescription],
            common::field_has,
        ),
        F::TextNameHas | F::AuthorHas | F::CitationHas | F::ClassificationHas => {
            (TEXT, &[T::Name], common::field_has)
        }
        F::CopyrightHolderHas => (TEXT, &[T::Image], common::field_has),
        F::SummaryHas => (TEXT, &[T::Comment, T::Project], common::field_has),
        F::TitleHas => (TEXT, &[T::Article, T::Project, T::SpeciesList], common::field_has),
        F::LocusHas | F::AccessionHas => (TEXT, &[T::Sequence], common::field_has),
        F::LoginHas => (TEXT, &[T::User], common::field_has),
        F::CodeHas => (TEXT, &[T::FieldSlip, T::Herbarium], common::field_has),
        F::NameHas | F::DescriptionHas => (TEXT, &[T::GlossaryTerm, T::Herbarium], common::field_has),
        F::MailingAddressHas => (TEXT, &[T::Herbarium], common::field_has),
        F::InitialDetHas | F::AccessionNumberHas => (TEXT, &[T::HerbariumRecord], common::field_has),
        F::CollectorHas | F::NumberHas => (TEXT, &[T::CollectionNumber], common::field_has),
        F::UrlHas => (TEXT, &[T::ExternalLink], common::field_has),
        F::BodyHas => (TEXT, &[T::Article], common::field_has),

        // Exact values
        F::Locus | F::Archive | F::Accession => {
            (Shape::List(Scalar::Text), &[T::Sequence], common::one_of)
        }
        F::Collectors | F::Numbers => {
            (Shape::List(Scalar::Text), &[T::CollectionNumber], common::one_of)
        }
        F::ExternalSites => (Shape::List(Scalar::Int), &[T::ExternalLink], common::one_of),
        F::License => (Shape::List(Scalar::Int), &[T::Image], common::one_of),
        F::Sources => (
            Shape::ChoiceList(SOURCE_TYPES),
            &[T::LocationDescription, T::NameDescription],
            common::one_of,
        ),
        F::Target => (Shape::Target, &[T::Comment], common::target),
        F::Types => (Shape::ChoiceList(TARGET_TYPES), &[T::Comment, T::RssLog], common::types),

        // Images
        F::Quality => (Shape::Range(Scalar::Float), &[T::Image], images::quality),
        F::Size => (Shape::Choice(IMAGE_SIZES), &[T::Image], images::size),
        F::ContentTypes => (Shape::ChoiceList(CONTENT_TYPES), &[T::Image], images::content_types),
    };

    FilterSpec {
        name,
        shape,
        applies_to,
        build,
    }
}

/// Column a per-field filter reads, checked against the schema.
pub(crate) fn field_column(filter: FilterName, record_type: RecordType, name: &str) -> Result<&'static str> {
    schema::column(record_type, name)
        .map(|c| c.name)
        .ok_or(QueryError::NotApplicable {
            record_type,
            name: filter.as_str(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in FilterName::ALL {
            assert_eq!(FilterName::parse(name.as_str()), Some(*name));
        }
        assert_eq!(FilterName::parse("colour"), None);
    }

    #[test]
    fn lookup_distinguishes_unknown_from_inapplicable() {
        let catalog = FilterCatalog::global();
        assert!(catalog.lookup(RecordType::Observation, "region").is_ok());

        let err = catalog.lookup(RecordType::Comment, "region").unwrap_err();
        assert!(matches!(err, QueryError::NotApplicable { name: "region", .. }));

        let err = catalog.lookup(RecordType::Comment, "colour").unwrap_err();
        assert!(matches!(err, QueryError::UnknownFilter { ref name, .. } if name == "colour"));
    }

    #[test]
    fn content_filters_are_shared() {
        let catalog = FilterCatalog::global();
        for (name, types) in [
            ("region", &[T::Observation, T::Location, T::SpeciesList][..]),
            ("clade", &[T::Observation, T::Name][..]),
            ("lichen", &[T::Observation, T::Name][..]),
            ("has_images", &[T::Observation][..]),
            ("has_specimen", &[T::Observation][..]),
        ] {
            for rt in types {
                assert!(catalog.lookup(*rt, name).is_ok(), "{name} on {rt}");
            }
        }
    }

    #[test]
    fn shared_filters_cover_most_types() {
        let catalog = FilterCatalog::global();
        for rt in RecordType::ALL {
            assert!(catalog.lookup(rt, "id_in_set").is_ok());
            assert!(catalog.lookup(rt, "created_at").is_ok());
        }
        assert!(catalog.lookup(RecordType::RssLog, "pattern").is_err());
        assert!(catalog.lookup(RecordType::User, "by_users").is_err());
    }

    #[test]
    fn per_field_filters_name_real_columns() {
        for spec in FilterCatalog::global().iter() {
            let Some(field) = spec.name.as_str().strip_suffix("_has") else {
                continue;
            };
            for rt in spec.applies_to {
                let ok = match (spec.name, field) {
                    (FilterName::CommentsHas | FilterName::ContentHas, _) => true,
                    (_, field) => common::has_column(*rt, field).is_some(),
                };
                assert!(ok, "{} on {rt}", spec.name);
            }
        }
    }
}
