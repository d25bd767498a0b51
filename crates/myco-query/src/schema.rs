//! Static description of every searchable record type.
//!
//! The catalog lists each type's columns, its associations (and how they are
//! linked), the columns searched by free-text patterns, and the subquery keys
//! that nest a parameter map under an association. It is built once on first
//! use and never changes.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::ordering::OrderKey;

/// A searchable record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Article,
    CollectionNumber,
    Comment,
    ExternalLink,
    FieldSlip,
    GlossaryTerm,
    Herbarium,
    HerbariumRecord,
    Image,
    Location,
    LocationDescription,
    Name,
    NameDescription,
    Naming,
    Observation,
    Project,
    RssLog,
    Sequence,
    SpeciesList,
    User,
}

impl RecordType {
    /// Every record type, in declaration order.
    pub const ALL: [RecordType; 20] = [
        RecordType::Article,
        RecordType::CollectionNumber,
        RecordType::Comment,
        RecordType::ExternalLink,
        RecordType::FieldSlip,
        RecordType::GlossaryTerm,
        RecordType::Herbarium,
        RecordType::HerbariumRecord,
        RecordType::Image,
        RecordType::Location,
        RecordType::LocationDescription,
        RecordType::Name,
        RecordType::NameDescription,
        RecordType::Naming,
        RecordType::Observation,
        RecordType::Project,
        RecordType::RssLog,
        RecordType::Sequence,
        RecordType::SpeciesList,
        RecordType::User,
    ];

    /// Snake-case tag, as used in parameters and fingerprints.
    pub fn tag(self) -> &'static str {
        match self {
            RecordType::Article => "article",
            RecordType::CollectionNumber => "collection_number",
            RecordType::Comment => "comment",
            RecordType::ExternalLink => "external_link",
            RecordType::FieldSlip => "field_slip",
            RecordType::GlossaryTerm => "glossary_term",
            RecordType::Herbarium => "herbarium",
            RecordType::HerbariumRecord => "herbarium_record",
            RecordType::Image => "image",
            RecordType::Location => "location",
            RecordType::LocationDescription => "location_description",
            RecordType::Name => "name",
            RecordType::NameDescription => "name_description",
            RecordType::Naming => "naming",
            RecordType::Observation => "observation",
            RecordType::Project => "project",
            RecordType::RssLog => "rss_log",
            RecordType::Sequence => "sequence",
            RecordType::SpeciesList => "species_list",
            RecordType::User => "user",
        }
    }

    /// Model name, as stored in polymorphic `target_type` columns.
    pub fn model_name(self) -> &'static str {
        match self {
            RecordType::Article => "Article",
            RecordType::CollectionNumber => "CollectionNumber",
            RecordType::Comment => "Comment",
            RecordType::ExternalLink => "ExternalLink",
            RecordType::FieldSlip => "FieldSlip",
            RecordType::GlossaryTerm => "GlossaryTerm",
            RecordType::Herbarium => "Herbarium",
            RecordType::HerbariumRecord => "HerbariumRecord",
            RecordType::Image => "Image",
            RecordType::Location => "Location",
            RecordType::LocationDescription => "LocationDescription",
            RecordType::Name => "Name",
            RecordType::NameDescription => "NameDescription",
            RecordType::Naming => "Naming",
            RecordType::Observation => "Observation",
            RecordType::Project => "Project",
            RecordType::RssLog => "RssLog",
            RecordType::Sequence => "Sequence",
            RecordType::SpeciesList => "SpeciesList",
            RecordType::User => "User",
        }
    }

    /// Table name.
    pub fn table(self) -> &'static str {
        match self {
            RecordType::Article => "articles",
            RecordType::CollectionNumber => "collection_numbers",
            RecordType::Comment => "comments",
            RecordType::ExternalLink => "external_links",
            RecordType::FieldSlip => "field_slips",
            RecordType::GlossaryTerm => "glossary_terms",
            RecordType::Herbarium => "herbaria",
            RecordType::HerbariumRecord => "herbarium_records",
            RecordType::Image => "images",
            RecordType::Location => "locations",
            RecordType::LocationDescription => "location_descriptions",
            RecordType::Name => "names",
            RecordType::NameDescription => "name_descriptions",
            RecordType::Naming => "namings",
            RecordType::Observation => "observations",
            RecordType::Project => "projects",
            RecordType::RssLog => "rss_logs",
            RecordType::Sequence => "sequences",
            RecordType::SpeciesList => "species_lists",
            RecordType::User => "users",
        }
    }

    /// Parses a tag, model name or table name.
    pub fn parse(input: &str) -> Result<RecordType> {
        let input = input.trim();
        RecordType::ALL
            .into_iter()
            .find(|rt| rt.tag() == input || rt.model_name() == input || rt.table() == input)
            .ok_or_else(|| QueryError::UnknownType(input.to_string()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

impl std::str::FromStr for RecordType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        RecordType::parse(s)
    }
}

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Primary key.
    Id,
    /// Foreign key to another record type.
    Ref(RecordType),
    Int,
    Float,
    Text,
    Bool,
    Date,
    /// Timestamp, stored as UTC.
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// How an association's target rows are found from a parent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// The parent row holds the target's id in this column.
    BelongsTo(&'static str),
    /// Target rows hold the parent's id in this column.
    HasMany(&'static str),
    /// A join table pairs parent ids (`near`) with target ids (`far`).
    Through {
        table: &'static str,
        near: &'static str,
        far: &'static str,
    },
    /// Target rows name the parent by model name and id.
    Polymorphic {
        type_column: &'static str,
        id_column: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub name: &'static str,
    pub target: RecordType,
    pub link: Link,
    /// Parameter key that nests a query on the target, e.g. `location_query`.
    pub subquery_key: Option<&'static str>,
}

/// Join tables referenced by [`Link::Through`] associations.
pub const JOIN_TABLES: &[&str] = &[
    "observation_collection_numbers",
    "observation_herbarium_records",
    "observation_images",
    "project_images",
    "project_members",
    "project_observations",
    "project_species_lists",
    "species_list_observations",
];

struct TypeInfo {
    columns: &'static [ColumnDescriptor],
    associations: &'static [Association],
    search_columns: &'static [&'static str],
}

static CATALOG: Lazy<Vec<TypeInfo>> =
    Lazy::new(|| RecordType::ALL.into_iter().map(type_info).collect());

fn info(record_type: RecordType) -> &'static TypeInfo {
    &CATALOG[record_type.index()]
}

/// Columns of a record type, primary key first.
pub fn columns_of(record_type: RecordType) -> &'static [ColumnDescriptor] {
    info(record_type).columns
}

pub fn column(record_type: RecordType, name: &str) -> Option<&'static ColumnDescriptor> {
    columns_of(record_type).iter().find(|c| c.name == name)
}

pub fn associations_of(record_type: RecordType) -> &'static [Association] {
    info(record_type).associations
}

pub fn association(record_type: RecordType, name: &str) -> Option<&'static Association> {
    associations_of(record_type).iter().find(|a| a.name == name)
}

/// Finds the association a `*_query` key nests under.
pub fn association_for_subquery(record_type: RecordType, key: &str) -> Option<&'static Association> {
    associations_of(record_type)
        .iter()
        .find(|a| a.subquery_key == Some(key))
}

/// Columns searched by free-text `pattern` filters. Empty when the type is
/// not pattern-searchable.
pub fn search_columns(record_type: RecordType) -> &'static [&'static str] {
    info(record_type).search_columns
}

/// Order used when a query names none.
pub fn default_order(record_type: RecordType) -> OrderKey {
    match record_type {
        RecordType::Observation => OrderKey::Date,
        RecordType::Comment
        | RecordType::Sequence
        | RecordType::Article
        | RecordType::Naming => OrderKey::CreatedAt,
        RecordType::Project | RecordType::RssLog => OrderKey::UpdatedAt,
        RecordType::SpeciesList => OrderKey::Title,
        RecordType::HerbariumRecord => OrderKey::HerbariumLabel,
        RecordType::CollectionNumber => OrderKey::NameAndNumber,
        RecordType::ExternalLink => OrderKey::Url,
        RecordType::FieldSlip => OrderKey::Code,
        RecordType::Name
        | RecordType::Location
        | RecordType::Image
        | RecordType::User
        | RecordType::Herbarium
        | RecordType::NameDescription
        | RecordType::LocationDescription
        | RecordType::GlossaryTerm => OrderKey::Name,
    }
}

macro_rules! columns {
    ($($name:literal => $kind:expr),* $(,)?) => {
        &[
            ColumnDescriptor { name: "id", kind: ColumnKind::Id },
            ColumnDescriptor { name: "created_at", kind: ColumnKind::Time },
            ColumnDescriptor { name: "updated_at", kind: ColumnKind::Time },
            $(ColumnDescriptor { name: $name, kind: $kind },)*
        ]
    };
}

const fn belongs_to(name: &'static str, target: RecordType, column: &'static str) -> Association {
    Association {
        name,
        target,
        link: Link::BelongsTo(column),
        subquery_key: None,
    }
}

const fn has_many(name: &'static str, target: RecordType, column: &'static str) -> Association {
    Association {
        name,
        target,
        link: Link::HasMany(column),
        subquery_key: None,
    }
}

const fn through(
    name: &'static str,
    target: RecordType,
    table: &'static str,
    near: &'static str,
    far: &'static str,
) -> Association {
    Association {
        name,
        target,
        link: Link::Through { table, near, far },
        subquery_key: None,
    }
}

const fn comments() -> Association {
    Association {
        name: "comments",
        target: RecordType::Comment,
        link: Link::Polymorphic {
            type_column: "target_type",
            id_column: "target_id",
        },
        subquery_key: None,
    }
}

impl Association {
    const fn subquery(mut self, key: &'static str) -> Association {
        self.subquery_key = Some(key);
        self
    }
}

fn type_info(record_type: RecordType) -> TypeInfo {
    use ColumnKind::*;
    use RecordType as T;

    match record_type {
        T::Observation => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "when" => Date,
                "name_id" => Ref(T::Name),
                "text_name" => Text,
                "classification" => Text,
                "lifeform" => Text,
                "location_id" => Ref(T::Location),
                "where" => Text,
                "lat" => Float,
                "lng" => Float,
                "gps_hidden" => Bool,
                "location_lat" => Float,
                "location_lng" => Float,
                "is_collection_location" => Bool,
                "specimen" => Bool,
                "notes" => Text,
                "vote_cache" => Float,
                "thumb_image_id" => Ref(T::Image),
                "rss_log_id" => Ref(T::RssLog),
                "num_views" => Int,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("name", T::Name, "name_id").subquery("name_query"),
                    belongs_to("location", T::Location, "location_id").subquery("location_query"),
                    belongs_to("thumb_image", T::Image, "thumb_image_id"),
                    belongs_to("rss_log", T::RssLog, "rss_log_id"),
                    through("images", T::Image, "observation_images", "observation_id", "image_id")
                        .subquery("image_query"),
                    has_many("sequences", T::Sequence, "observation_id").subquery("sequence_query"),
                    comments(),
                    has_many("namings", T::Naming, "observation_id"),
                    through("projects", T::Project, "project_observations", "observation_id", "project_id"),
                    through(
                        "species_lists",
                        T::SpeciesList,
                        "species_list_observations",
                        "observation_id",
                        "species_list_id",
                    ),
                    through(
                        "herbarium_records",
                        T::HerbariumRecord,
                        "observation_herbarium_records",
                        "observation_id",
                        "herbarium_record_id",
                    ),
                    through(
                        "collection_numbers",
                        T::CollectionNumber,
                        "observation_collection_numbers",
                        "observation_id",
                        "collection_number_id",
                    ),
                    has_many("field_slips", T::FieldSlip, "observation_id"),
                    has_many("external_links", T::ExternalLink, "observation_id"),
                ]
            },
            search_columns: &["where", "text_name", "notes"],
        },
        T::Name => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "text_name" => Text,
                "search_name" => Text,
                "sort_name" => Text,
                "author" => Text,
                "citation" => Text,
                "classification" => Text,
                "lifeform" => Text,
                "notes" => Text,
                "rank" => Text,
                "deprecated" => Bool,
                "synonym_id" => Int,
                "correct_spelling_id" => Ref(T::Name),
                "description_id" => Ref(T::NameDescription),
                "ok_for_export" => Bool,
                "rss_log_id" => Ref(T::RssLog),
                "num_views" => Int,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    has_many("observations", T::Observation, "name_id").subquery("observation_query"),
                    has_many("descriptions", T::NameDescription, "name_id")
                        .subquery("description_query"),
                    belongs_to("default_description", T::NameDescription, "description_id"),
                    belongs_to("correct_spelling", T::Name, "correct_spelling_id"),
                    belongs_to("rss_log", T::RssLog, "rss_log_id"),
                    has_many("namings", T::Naming, "name_id"),
                    comments(),
                ]
            },
            search_columns: &["search_name", "citation", "classification", "notes"],
        },
        T::Location => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "name" => Text,
                "scientific_name" => Text,
                "north" => Float,
                "south" => Float,
                "east" => Float,
                "west" => Float,
                "box_area" => Float,
                "notes" => Text,
                "description_id" => Ref(T::LocationDescription),
                "rss_log_id" => Ref(T::RssLog),
                "num_views" => Int,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    has_many("observations", T::Observation, "location_id")
                        .subquery("observation_query"),
                    has_many("descriptions", T::LocationDescription, "location_id")
                        .subquery("description_query"),
                    has_many("species_lists", T::SpeciesList, "location_id"),
                    belongs_to("rss_log", T::RssLog, "rss_log_id"),
                    comments(),
                ]
            },
            search_columns: &["name", "notes"],
        },
        T::Image => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "when" => Date,
                "notes" => Text,
                "copyright_holder" => Text,
                "license_id" => Int,
                "vote_cache" => Float,
                "width" => Int,
                "height" => Int,
                "content_type" => Text,
                "original_name" => Text,
                "ok_for_export" => Bool,
                "num_views" => Int,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    through("observations", T::Observation, "observation_images", "image_id", "observation_id")
                        .subquery("observation_query"),
                    through("projects", T::Project, "project_images", "image_id", "project_id"),
                ]
            },
            search_columns: &["notes", "copyright_holder", "original_name"],
        },
        T::Comment => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "summary" => Text,
                "comment" => Text,
                "target_type" => Text,
                "target_id" => Int,
            ],
            associations: &const { [belongs_to("user", T::User, "user_id")] },
            search_columns: &["summary", "comment"],
        },
        T::Project => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "title" => Text,
                "summary" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    through("observations", T::Observation, "project_observations", "project_id", "observation_id")
                        .subquery("observation_query"),
                    through("images", T::Image, "project_images", "project_id", "image_id"),
                    through(
                        "species_lists",
                        T::SpeciesList,
                        "project_species_lists",
                        "project_id",
                        "species_list_id",
                    ),
                    through("members", T::User, "project_members", "project_id", "user_id"),
                    has_many("field_slips", T::FieldSlip, "project_id"),
                ]
            },
            search_columns: &["title", "summary"],
        },
        T::Sequence => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "observation_id" => Ref(T::Observation),
                "locus" => Text,
                "bases" => Text,
                "archive" => Text,
                "accession" => Text,
                "notes" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("observation", T::Observation, "observation_id")
                        .subquery("observation_query"),
                ]
            },
            search_columns: &["locus", "accession", "notes"],
        },
        T::SpeciesList => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "when" => Date,
                "title" => Text,
                "where" => Text,
                "location_id" => Ref(T::Location),
                "notes" => Text,
                "rss_log_id" => Ref(T::RssLog),
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("location", T::Location, "location_id"),
                    through(
                        "observations",
                        T::Observation,
                        "species_list_observations",
                        "species_list_id",
                        "observation_id",
                    )
                    .subquery("observation_query"),
                    through(
                        "projects",
                        T::Project,
                        "project_species_lists",
                        "species_list_id",
                        "project_id",
                    ),
                    belongs_to("rss_log", T::RssLog, "rss_log_id"),
                    comments(),
                ]
            },
            search_columns: &["title", "where", "notes"],
        },
        T::User => TypeInfo {
            columns: columns![
                "login" => Text,
                "name" => Text,
                "contribution" => Int,
                "last_login" => Time,
            ],
            associations: &const {
                [
                    has_many("observations", T::Observation, "user_id"),
                    has_many("images", T::Image, "user_id"),
                ]
            },
            search_columns: &["login", "name"],
        },
        T::Herbarium => TypeInfo {
            columns: columns![
                "code" => Text,
                "name" => Text,
                "description" => Text,
                "mailing_address" => Text,
                "personal_user_id" => Ref(T::User),
            ],
            associations: &const {
                [
                    has_many("herbarium_records", T::HerbariumRecord, "herbarium_id"),
                    belongs_to("personal_user", T::User, "personal_user_id"),
                ]
            },
            search_columns: &["code", "name", "description", "mailing_address"],
        },
        T::HerbariumRecord => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "herbarium_id" => Ref(T::Herbarium),
                "initial_det" => Text,
                "accession_number" => Text,
                "notes" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("herbarium", T::Herbarium, "herbarium_id"),
                    through(
                        "observations",
                        T::Observation,
                        "observation_herbarium_records",
                        "herbarium_record_id",
                        "observation_id",
                    )
                    .subquery("observation_query"),
                ]
            },
            search_columns: &["initial_det", "accession_number", "notes"],
        },
        T::NameDescription => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "name_id" => Ref(T::Name),
                "public" => Bool,
                "source_type" => Text,
                "gen_desc" => Text,
                "diag_desc" => Text,
                "notes" => Text,
                "ok_for_export" => Bool,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("name", T::Name, "name_id").subquery("name_query"),
                ]
            },
            search_columns: &["gen_desc", "diag_desc", "notes"],
        },
        T::LocationDescription => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "location_id" => Ref(T::Location),
                "public" => Bool,
                "source_type" => Text,
                "gen_desc" => Text,
                "ecology" => Text,
                "notes" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("location", T::Location, "location_id").subquery("location_query"),
                ]
            },
            search_columns: &["gen_desc", "ecology", "notes"],
        },
        T::CollectionNumber => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "name" => Text,
                "number" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    through(
                        "observations",
                        T::Observation,
                        "observation_collection_numbers",
                        "collection_number_id",
                        "observation_id",
                    ),
                ]
            },
            search_columns: &["name", "number"],
        },
        T::ExternalLink => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "observation_id" => Ref(T::Observation),
                "external_site_id" => Int,
                "url" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("observation", T::Observation, "observation_id"),
                ]
            },
            search_columns: &["url"],
        },
        T::FieldSlip => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "observation_id" => Ref(T::Observation),
                "project_id" => Ref(T::Project),
                "code" => Text,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("observation", T::Observation, "observation_id"),
                    belongs_to("project", T::Project, "project_id"),
                ]
            },
            search_columns: &["code"],
        },
        T::GlossaryTerm => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "name" => Text,
                "description" => Text,
            ],
            associations: &const { [belongs_to("user", T::User, "user_id")] },
            search_columns: &["name", "description"],
        },
        T::Article => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "title" => Text,
                "body" => Text,
            ],
            associations: &const { [belongs_to("user", T::User, "user_id")] },
            search_columns: &["title", "body"],
        },
        T::RssLog => TypeInfo {
            columns: columns![
                "observation_id" => Ref(T::Observation),
                "name_id" => Ref(T::Name),
                "location_id" => Ref(T::Location),
                "species_list_id" => Ref(T::SpeciesList),
                "project_id" => Ref(T::Project),
                "article_id" => Ref(T::Article),
                "glossary_term_id" => Ref(T::GlossaryTerm),
            ],
            associations: &const {
                [
                    belongs_to("observation", T::Observation, "observation_id"),
                    belongs_to("name", T::Name, "name_id"),
                    belongs_to("location", T::Location, "location_id"),
                    belongs_to("species_list", T::SpeciesList, "species_list_id"),
                    belongs_to("project", T::Project, "project_id"),
                    belongs_to("article", T::Article, "article_id"),
                    belongs_to("glossary_term", T::GlossaryTerm, "glossary_term_id"),
                ]
            },
            search_columns: &[],
        },
        T::Naming => TypeInfo {
            columns: columns![
                "user_id" => Ref(T::User),
                "observation_id" => Ref(T::Observation),
                "name_id" => Ref(T::Name),
                "vote_cache" => Float,
            ],
            associations: &const {
                [
                    belongs_to("user", T::User, "user_id"),
                    belongs_to("observation", T::Observation, "observation_id"),
                    belongs_to("name", T::Name, "name_id"),
                ]
            },
            search_columns: &[],
        },
    }
}
