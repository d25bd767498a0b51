//! Result ordering: symbolic order keys and the sort terms they resolve to.
//!
//! A query names its order with `by` (a symbolic [`OrderKey`], optionally
//! prefixed `reverse_`) or `order_by` (explicit column names, `-` for
//! descending). Either way it resolves to a list of [`SortTerm`]s that always
//! ends with the primary key, so no two rows ever tie.

use std::cmp::Ordering;
use std::fmt;

use crate::context::{LocationFormat, QueryContext};
use crate::error::{QueryError, Result};
use crate::schema::{self, RecordType};
use crate::value::{compare_values, Id, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dir {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl Dir {
    /// Applies this direction to an ordering.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Dir::Asc => ordering,
            Dir::Desc => ordering.reverse(),
        }
    }

    pub fn reverse(self) -> Dir {
        match self {
            Dir::Asc => Dir::Desc,
            Dir::Desc => Dir::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dir::Asc => "ASC",
            Dir::Desc => "DESC",
        }
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a sort term takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum SortSource {
    /// A column reached by following `path` (association names) from the
    /// row. An empty path is the row itself. When the path fans out, the
    /// smallest value wins. `fallback` is read when `column` is blank.
    Field {
        path: &'static [&'static str],
        column: &'static str,
        fallback: Option<&'static str>,
    },
    /// Position of the row's id in an explicit list.
    Position(Vec<Id>),
}

impl SortSource {
    pub const fn column(column: &'static str) -> SortSource {
        SortSource::Field {
            path: &[],
            column,
            fallback: None,
        }
    }

    pub const fn related(path: &'static [&'static str], column: &'static str) -> SortSource {
        SortSource::Field {
            path,
            column,
            fallback: None,
        }
    }

    fn or(self, fallback: &'static str) -> SortSource {
        match self {
            SortSource::Field { path, column, .. } => SortSource::Field {
                path,
                column,
                fallback: Some(fallback),
            },
            other => other,
        }
    }
}

impl fmt::Display for SortSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortSource::Field {
                path,
                column,
                fallback,
            } => {
                let mut name = String::new();
                for step in path.iter() {
                    name.push_str(step);
                    name.push('.');
                }
                name.push_str(column);
                match fallback {
                    Some(fallback) => write!(f, "COALESCE({name}, {fallback})"),
                    None => write!(f, "{name}"),
                }
            }
            SortSource::Position(ids) => write!(f, "POSITION(id IN {ids:?})"),
        }
    }
}

/// One resolved sort term.
#[derive(Debug, Clone, PartialEq)]
pub struct SortTerm {
    pub source: SortSource,
    pub dir: Dir,
    /// Text is accent-folded and lowercased before comparing.
    pub folded: bool,
}

impl SortTerm {
    fn new(source: SortSource, dir: Dir) -> SortTerm {
        SortTerm {
            source,
            dir,
            folded: false,
        }
    }

    fn asc(source: SortSource) -> SortTerm {
        SortTerm::new(source, Dir::Asc)
    }

    fn desc(source: SortSource) -> SortTerm {
        SortTerm::new(source, Dir::Desc)
    }

    fn folded(mut self, folded: bool) -> SortTerm {
        self.folded = folded;
        self
    }

    /// The primary key term that closes every resolved order.
    pub fn primary_key(dir: Dir) -> SortTerm {
        SortTerm::new(SortSource::column("id"), dir)
    }
}

impl fmt::Display for SortTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folded {
            write!(f, "FOLD({}) {}", self.source, self.dir)
        } else {
            write!(f, "{} {}", self.source, self.dir)
        }
    }
}

/// Symbolic order keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKey {
    Date,
    CreatedAt,
    UpdatedAt,
    Id,
    Name,
    RssLog,
    Confidence,
    ImageQuality,
    Location,
    User,
    Title,
    Where,
    Login,
    Contribution,
    LastLogin,
    NumViews,
    BoxArea,
    Summary,
    CopyrightHolder,
    OriginalName,
    Code,
    CodeThenName,
    AccessionNumber,
    InitialDet,
    HerbariumLabel,
    HerbariumName,
    NameAndNumber,
    Url,
    Observation,
    ThumbnailQuality,
}

impl OrderKey {
    pub const ALL: [OrderKey; 30] = [
        OrderKey::Date,
        OrderKey::CreatedAt,
        OrderKey::UpdatedAt,
        OrderKey::Id,
        OrderKey::Name,
        OrderKey::RssLog,
        OrderKey::Confidence,
        OrderKey::ImageQuality,
        OrderKey::Location,
        OrderKey::User,
        OrderKey::Title,
        OrderKey::Where,
        OrderKey::Login,
        OrderKey::Contribution,
        OrderKey::LastLogin,
        OrderKey::NumViews,
        OrderKey::BoxArea,
        OrderKey::Summary,
        OrderKey::CopyrightHolder,
        OrderKey::OriginalName,
        OrderKey::Code,
        OrderKey::CodeThenName,
        OrderKey::AccessionNumber,
        OrderKey::InitialDet,
        OrderKey::HerbariumLabel,
        OrderKey::HerbariumName,
        OrderKey::NameAndNumber,
        OrderKey::Url,
        OrderKey::Observation,
        OrderKey::ThumbnailQuality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderKey::Date => "date",
            OrderKey::CreatedAt => "created_at",
            OrderKey::UpdatedAt => "updated_at",
            OrderKey::Id => "id",
            OrderKey::Name => "name",
            OrderKey::RssLog => "rss_log",
            OrderKey::Confidence => "confidence",
            OrderKey::ImageQuality => "image_quality",
            OrderKey::Location => "location",
            OrderKey::User => "user",
            OrderKey::Title => "title",
            OrderKey::Where => "where",
            OrderKey::Login => "login",
            OrderKey::Contribution => "contribution",
            OrderKey::LastLogin => "last_login",
            OrderKey::NumViews => "num_views",
            OrderKey::BoxArea => "box_area",
            OrderKey::Summary => "summary",
            OrderKey::CopyrightHolder => "copyright_holder",
            OrderKey::OriginalName => "original_name",
            OrderKey::Code => "code",
            OrderKey::CodeThenName => "code_then_name",
            OrderKey::AccessionNumber => "accession_number",
            OrderKey::InitialDet => "initial_det",
            OrderKey::HerbariumLabel => "herbarium_label",
            OrderKey::HerbariumName => "herbarium_name",
            OrderKey::NameAndNumber => "name_and_number",
            OrderKey::Url => "url",
            OrderKey::Observation => "observation",
            OrderKey::ThumbnailQuality => "thumbnail_quality",
        }
    }

    pub fn parse(input: &str) -> Option<OrderKey> {
        OrderKey::ALL.into_iter().find(|key| key.as_str() == input)
    }

    /// Returns `true` if this key's terms depend on the location format.
    pub fn uses_location_format(self, record_type: RecordType) -> bool {
        matches!(
            (self, record_type),
            (OrderKey::Name, RecordType::Location | RecordType::LocationDescription)
                | (OrderKey::Location, RecordType::Observation | RecordType::SpeciesList)
        )
    }

    /// Sort terms for this key, without the primary-key tie-break.
    ///
    /// Returns `None` when the key has no meaning for the record type.
    fn terms(self, record_type: RecordType, format: LocationFormat, fold: bool) -> Option<Vec<SortTerm>> {
        use RecordType as T;
        use SortSource as S;

        let place = match format {
            LocationFormat::Postal => "name",
            LocationFormat::Scientific => "scientific_name",
        };
        let has = |col: &str| schema::column(record_type, col).is_some();
        let sort_name = |path: &'static [&'static str]| vec![SortTerm::asc(S::related(path, "sort_name")).folded(fold)];

        let terms = match (self, record_type) {
            (OrderKey::Date, _) if has("when") => vec![
                SortTerm::desc(S::column("when")),
                SortTerm::desc(S::column("created_at")),
            ],
            (OrderKey::Date | OrderKey::CreatedAt, _) => vec![SortTerm::desc(S::column("created_at"))],
            (OrderKey::UpdatedAt, _) => vec![SortTerm::desc(S::column("updated_at"))],
            (OrderKey::Id, _) => vec![SortTerm::asc(S::column("id"))],

            (OrderKey::Name, T::Name) => sort_name(&[]),
            (OrderKey::Name, T::Observation | T::NameDescription | T::Naming) => sort_name(&["name"]),
            (OrderKey::Name, T::Image | T::HerbariumRecord) => sort_name(&["observations", "name"]),
            (OrderKey::Name, T::Location) => vec![SortTerm::asc(S::column(place)).folded(fold)],
            (OrderKey::Name, T::LocationDescription) => {
                vec![SortTerm::asc(S::related(&["location"], place)).folded(fold)]
            }
            (OrderKey::Name, T::User) => {
                vec![SortTerm::asc(S::column("name").or("login")).folded(fold)]
            }
            (OrderKey::Name, T::Herbarium | T::GlossaryTerm | T::CollectionNumber) => {
                vec![SortTerm::asc(S::column("name")).folded(fold)]
            }

            (OrderKey::RssLog, _) if has("rss_log_id") => {
                vec![SortTerm::desc(S::related(&["rss_log"], "updated_at"))]
            }
            (OrderKey::Confidence, T::Observation | T::Naming) => {
                vec![SortTerm::desc(S::column("vote_cache"))]
            }
            (OrderKey::Confidence, T::Image) => {
                vec![SortTerm::desc(S::related(&["observations"], "vote_cache"))]
            }
            (OrderKey::ImageQuality, T::Image) => vec![SortTerm::desc(S::column("vote_cache"))],
            (OrderKey::ThumbnailQuality, T::Observation) => {
                vec![SortTerm::desc(S::related(&["thumb_image"], "vote_cache"))]
            }
            (OrderKey::Location, T::Observation | T::SpeciesList) => {
                vec![SortTerm::asc(S::related(&["location"], place)).folded(fold)]
            }
            (OrderKey::User, _) if schema::association(record_type, "user").is_some() => {
                vec![SortTerm::asc(S::related(&["user"], "name").or("login")).folded(fold)]
            }
            (OrderKey::Title, T::Project | T::SpeciesList | T::Article) => {
                vec![SortTerm::asc(S::column("title")).folded(fold)]
            }
            (OrderKey::Where, T::Observation | T::SpeciesList) => {
                vec![SortTerm::asc(S::column("where")).folded(fold)]
            }
            (OrderKey::Login, T::User) => vec![SortTerm::asc(S::column("login"))],
            (OrderKey::Contribution, T::User) => vec![SortTerm::desc(S::column("contribution"))],
            (OrderKey::LastLogin, T::User) => vec![SortTerm::desc(S::column("last_login"))],
            (OrderKey::NumViews, _) if has("num_views") => vec![SortTerm::desc(S::column("num_views"))],
            (OrderKey::BoxArea, T::Location) => vec![SortTerm::desc(S::column("box_area"))],
            (OrderKey::Summary, T::Comment | T::Project) => vec![SortTerm::asc(S::column("summary"))],
            (OrderKey::CopyrightHolder, T::Image) => {
                vec![SortTerm::asc(S::column("copyright_holder"))]
            }
            (OrderKey::OriginalName, T::Image) => vec![SortTerm::asc(S::column("original_name"))],
            (OrderKey::Code, T::Herbarium | T::FieldSlip) => vec![SortTerm::asc(S::column("code"))],
            (OrderKey::CodeThenName, T::Herbarium) => vec![
                SortTerm::asc(S::column("code")),
                SortTerm::asc(S::column("name")).folded(fold),
            ],
            (OrderKey::AccessionNumber, T::HerbariumRecord) => {
                vec![SortTerm::asc(S::column("accession_number"))]
            }
            (OrderKey::AccessionNumber, T::Sequence) => vec![SortTerm::asc(S::column("accession"))],
            (OrderKey::InitialDet, T::HerbariumRecord) => vec![SortTerm::asc(S::column("initial_det"))],
            (OrderKey::HerbariumLabel, T::HerbariumRecord) => vec![
                SortTerm::asc(S::column("initial_det")),
                SortTerm::asc(S::column("accession_number")),
            ],
            (OrderKey::HerbariumName, T::HerbariumRecord) => {
                vec![SortTerm::asc(S::related(&["herbarium"], "name")).folded(fold)]
            }
            (OrderKey::NameAndNumber, T::CollectionNumber) => vec![
                SortTerm::asc(S::column("name")).folded(fold),
                SortTerm::asc(S::column("number")),
            ],
            (OrderKey::Url, T::ExternalLink) => vec![SortTerm::asc(S::column("url"))],
            (OrderKey::Observation, T::Sequence | T::ExternalLink | T::FieldSlip | T::Naming) => {
                vec![SortTerm::asc(S::column("observation_id"))]
            }
            (OrderKey::Observation, T::HerbariumRecord | T::CollectionNumber) => {
                vec![SortTerm::asc(S::related(&["observations"], "id"))]
            }
            _ => return None,
        };
        Some(terms)
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits `reverse_<key>` into the key and a reversal flag.
pub fn parse_by(record_type: RecordType, by: &str) -> Result<(OrderKey, bool)> {
    let (name, reversed) = match by.strip_prefix("reverse_") {
        Some(rest) => (rest, true),
        None => (by, false),
    };
    OrderKey::parse(name)
        .map(|key| (key, reversed))
        .ok_or_else(|| QueryError::UnknownOrder {
            record_type,
            key: by.to_string(),
        })
}

/// Turns the top-level ordering parameters into sort terms.
#[derive(Debug, Clone, Copy)]
pub struct OrderingResolver<'a> {
    pub context: &'a QueryContext,
    pub accent_folding: bool,
}

impl OrderingResolver<'_> {
    /// Resolves `by` / `order_by` for a record type.
    ///
    /// `by` wins when both are given. With neither, an explicit `id_order`
    /// (from `id_in_set`) is followed, then the type's default order. The
    /// primary key always closes the list, in the direction of the last term.
    pub fn resolve(
        &self,
        record_type: RecordType,
        by: Option<&str>,
        order_by: Option<&[String]>,
        id_order: Option<&[Id]>,
    ) -> Result<Vec<SortTerm>> {
        let mut terms = match (by, order_by, id_order) {
            (Some(by), _, _) => {
                let (key, reversed) = parse_by(record_type, by)?;
                let mut terms = self.key_terms(record_type, key, by)?;
                if reversed {
                    for term in &mut terms {
                        term.dir = term.dir.reverse();
                    }
                }
                terms
            }
            (None, Some(columns), _) => explicit_terms(record_type, columns)?,
            (None, None, Some(ids)) => vec![SortTerm::asc(SortSource::Position(ids.to_vec()))],
            (None, None, None) => {
                let key = schema::default_order(record_type);
                self.key_terms(record_type, key, key.as_str())?
            }
        };

        let last_dir = terms.last().map(|t| t.dir).unwrap_or_default();
        if !ends_with_primary_key(&terms) {
            terms.push(SortTerm::primary_key(last_dir));
        }
        Ok(terms)
    }

    fn key_terms(&self, record_type: RecordType, key: OrderKey, raw: &str) -> Result<Vec<SortTerm>> {
        key.terms(record_type, self.context.location_format, self.accent_folding)
            .ok_or_else(|| QueryError::UnknownOrder {
                record_type,
                key: raw.to_string(),
            })
    }
}

fn ends_with_primary_key(terms: &[SortTerm]) -> bool {
    terms.last().is_some_and(|term| {
        matches!(&term.source, SortSource::Field { path, column, .. } if path.is_empty() && *column == "id")
    })
}

fn explicit_terms(record_type: RecordType, columns: &[String]) -> Result<Vec<SortTerm>> {
    columns
        .iter()
        .map(|raw| {
            let (name, dir) = match raw.strip_prefix('-') {
                Some(rest) => (rest, Dir::Desc),
                None => (raw.as_str(), Dir::Asc),
            };
            let column = schema::column(record_type, name).ok_or_else(|| QueryError::UnknownOrder {
                record_type,
                key: raw.clone(),
            })?;
            Ok(SortTerm::new(SortSource::column(column.name), dir))
        })
        .collect()
}

/// Folds text for name-alphabetical sorting: accents stripped, lowercased.
pub fn fold(text: &str) -> String {
    deunicode::deunicode(text).to_lowercase()
}

/// Compares two sort values. Nulls sort after everything else, text
/// compares bytewise, and mismatched types compare equal.
pub fn compare_sort_values(a: &Value<'_>, b: &Value<'_>) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(context: &QueryContext) -> OrderingResolver<'_> {
        OrderingResolver {
            context,
            accent_folding: true,
        }
    }

    #[test]
    fn dir_apply() {
        assert_eq!(Dir::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(Dir::Desc.apply(Ordering::Less), Ordering::Greater);
        assert_eq!(Dir::Desc.apply(Ordering::Equal), Ordering::Equal);
    }

    #[test]
    fn every_default_resolves_and_ends_with_id() {
        let context = QueryContext::default();
        for rt in RecordType::ALL {
            let terms = resolver(&context).resolve(rt, None, None, None).unwrap();
            let last = terms.last().unwrap();
            assert_eq!(last.source, SortSource::column("id"), "{rt}");
        }
    }

    #[test]
    fn tie_break_follows_last_direction() {
        let context = QueryContext::default();
        let terms = resolver(&context)
            .resolve(RecordType::Observation, Some("date"), None, None)
            .unwrap();
        assert_eq!(terms.last().unwrap().dir, Dir::Desc);

        let terms = resolver(&context)
            .resolve(RecordType::Observation, Some("reverse_date"), None, None)
            .unwrap();
        assert!(terms.iter().all(|t| t.dir == Dir::Asc));
    }

    #[test]
    fn by_id_is_not_doubled() {
        let context = QueryContext::default();
        let terms = resolver(&context)
            .resolve(RecordType::Comment, Some("id"), None, None)
            .unwrap();
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn by_wins_over_order_by() {
        let context = QueryContext::default();
        let columns = vec!["-when".to_string()];
        let terms = resolver(&context)
            .resolve(RecordType::Observation, Some("id"), Some(&columns), None)
            .unwrap();
        assert_eq!(terms, vec![SortTerm::primary_key(Dir::Asc)]);
    }

    #[test]
    fn order_by_columns() {
        let context = QueryContext::default();
        let columns = vec!["-when".to_string(), "where".to_string()];
        let terms = resolver(&context)
            .resolve(RecordType::Observation, None, Some(&columns), None)
            .unwrap();
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].dir, Dir::Desc);
        assert_eq!(terms[1].source, SortSource::column("where"));
        assert_eq!(terms[2], SortTerm::primary_key(Dir::Asc));

        let bad = vec!["colour".to_string()];
        let err = resolver(&context)
            .resolve(RecordType::Observation, None, Some(&bad), None)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownOrder { .. }));
    }

    #[test]
    fn unknown_and_inapplicable_keys() {
        let context = QueryContext::default();
        for by in ["colour", "reverse_colour", "box_area"] {
            let err = resolver(&context)
                .resolve(RecordType::Comment, Some(by), None, None)
                .unwrap_err();
            assert!(matches!(err, QueryError::UnknownOrder { .. }), "{by}");
        }
    }

    #[test]
    fn location_name_follows_format() {
        let postal = QueryContext::default();
        let terms = resolver(&postal)
            .resolve(RecordType::Location, Some("name"), None, None)
            .unwrap();
        assert_eq!(terms[0].source, SortSource::column("name"));
        assert!(terms[0].folded);

        let scientific = QueryContext::default().with_location_format(LocationFormat::Scientific);
        let terms = resolver(&scientific)
            .resolve(RecordType::Location, Some("name"), None, None)
            .unwrap();
        assert_eq!(terms[0].source, SortSource::column("scientific_name"));
        assert!(OrderKey::Name.uses_location_format(RecordType::Location));
        assert!(!OrderKey::Name.uses_location_format(RecordType::Name));
    }

    #[test]
    fn id_order_used_only_without_explicit_order() {
        let context = QueryContext::default();
        let ids = [3, 1, 2];
        let terms = resolver(&context)
            .resolve(RecordType::Name, None, None, Some(&ids))
            .unwrap();
        assert_eq!(terms[0].source, SortSource::Position(vec![3, 1, 2]));

        let terms = resolver(&context)
            .resolve(RecordType::Name, Some("id"), None, Some(&ids))
            .unwrap();
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn fold_strips_accents() {
        assert_eq!(fold("Évora"), "evora");
        assert_eq!(fold("Agaricus"), "agaricus");
    }

    #[test]
    fn nulls_sort_last() {
        let some = Value::Text("a");
        assert_eq!(compare_sort_values(&Value::Null, &some), Ordering::Greater);
        assert_eq!(compare_sort_values(&some, &Value::Null), Ordering::Less);
        assert_eq!(compare_sort_values(&Value::Text("B"), &Value::Text("a")), Ordering::Less);
    }
}
