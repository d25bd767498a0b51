//! The compiled predicate tree.
//!
//! Filters build [`Predicate`]s with the smart constructors here, which keep
//! trees flat and fold away constant branches. A predicate is evaluated by a
//! [`Store`](crate::Store) against rows of one record type; [`Predicate::Exists`]
//! steps into an associated type.

use std::collections::BTreeSet;
use std::fmt;

use crate::op::Op;
use crate::schema::{Association, RecordType};
use crate::value::Literal;

/// Part of a date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
}

impl DatePart {
    pub fn as_str(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
        }
    }
}

/// A column reference, optionally narrowed to a date part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Field(&'static str),
    Part(&'static str, DatePart),
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Field(name) | Column::Part(name, _) => name,
        }
    }
}

impl From<&'static str> for Column {
    fn from(name: &'static str) -> Self {
        Column::Field(name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Field(name) => write!(f, "{name}"),
            Column::Part(name, part) => write!(f, "{}({name})", part.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Column compared to a literal. Null columns never match.
    Compare {
        column: Column,
        op: Op,
        value: Literal,
    },
    /// Column equal to one of the values.
    InSet {
        column: Column,
        values: Vec<Literal>,
    },
    IsNull(Column),
    /// Column is null or whitespace.
    Blank(Column),
    /// Case-insensitive SQL `LIKE`.
    Like {
        column: Column,
        pattern: String,
    },
    /// Case-insensitive regular expression search.
    Regex {
        column: Column,
        pattern: String,
    },
    /// Two columns of the same row compared.
    Columns {
        left: Column,
        op: Op,
        right: Column,
    },
    /// Some associated row satisfies `filter`.
    Exists {
        association: &'static Association,
        filter: Box<Predicate>,
    },
}

impl Predicate {
    /// Conjunction. Nested conjunctions are flattened, `True` parts dropped,
    /// and any `False` part makes the whole `False`.
    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::True,
            1 => flat.pop().unwrap_or(Predicate::True),
            _ => Predicate::And(flat),
        }
    }

    /// Disjunction, simplified the same way as [`and`](Self::and).
    pub fn or(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::False => {}
                Predicate::True => return Predicate::True,
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::False,
            1 => flat.pop().unwrap_or(Predicate::False),
            _ => Predicate::Or(flat),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(part: Predicate) -> Predicate {
        match part {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    pub fn compare(column: impl Into<Column>, op: Op, value: impl Into<Literal>) -> Predicate {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<Column>, value: impl Into<Literal>) -> Predicate {
        Predicate::compare(column, Op::Eq, value)
    }

    /// Membership. An empty set matches nothing.
    pub fn in_set<L: Into<Literal>>(column: impl Into<Column>, values: impl IntoIterator<Item = L>) -> Predicate {
        let values: Vec<Literal> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            Predicate::False
        } else {
            Predicate::InSet {
                column: column.into(),
                values,
            }
        }
    }

    pub fn is_null(column: impl Into<Column>) -> Predicate {
        Predicate::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<Column>) -> Predicate {
        Predicate::not(Predicate::is_null(column))
    }

    pub fn blank(column: impl Into<Column>) -> Predicate {
        Predicate::Blank(column.into())
    }

    pub fn like(column: impl Into<Column>, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn regex(column: impl Into<Column>, pattern: impl Into<String>) -> Predicate {
        Predicate::Regex {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn columns(left: impl Into<Column>, op: Op, right: impl Into<Column>) -> Predicate {
        Predicate::Columns {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    /// Existence join. A `False` filter can never be satisfied, so the join
    /// collapses to `False`.
    pub fn exists(association: &'static Association, filter: Predicate) -> Predicate {
        match filter {
            Predicate::False => Predicate::False,
            filter => Predicate::Exists {
                association,
                filter: Box::new(filter),
            },
        }
    }

    /// Returns `true` if any existence join appears in the tree.
    pub fn has_exists(&self) -> bool {
        match self {
            Predicate::Exists { .. } => true,
            Predicate::And(parts) | Predicate::Or(parts) => parts.iter().any(Predicate::has_exists),
            Predicate::Not(inner) => inner.has_exists(),
            _ => false,
        }
    }

    /// Record types whose rows can change this predicate's result, starting
    /// from `root`.
    pub fn touched_types(&self, root: RecordType) -> BTreeSet<RecordType> {
        let mut out = BTreeSet::new();
        out.insert(root);
        self.collect_types(&mut out);
        out
    }

    fn collect_types(&self, out: &mut BTreeSet<RecordType>) {
        match self {
            Predicate::Exists {
                association,
                filter,
            } => {
                out.insert(association.target);
                filter.collect_types(out);
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_types(out);
                }
            }
            Predicate::Not(inner) => inner.collect_types(out),
            _ => {}
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::False => write!(f, "FALSE"),
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
            Predicate::Not(inner) => match inner.as_ref() {
                Predicate::IsNull(column) => write!(f, "{column} IS NOT NULL"),
                inner => write!(f, "NOT {inner}"),
            },
            Predicate::Compare { column, op, value } => write!(f, "{column} {op} {value}"),
            Predicate::InSet { column, values } => {
                write!(f, "{column} IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
            Predicate::IsNull(column) => write!(f, "{column} IS NULL"),
            Predicate::Blank(column) => write!(f, "COALESCE(TRIM({column}), '') = ''"),
            Predicate::Like { column, pattern } => {
                write!(f, "{column} LIKE {}", Literal::Text(pattern.clone()))
            }
            Predicate::Regex { column, pattern } => {
                write!(f, "{column} REGEXP {}", Literal::Text(pattern.clone()))
            }
            Predicate::Columns { left, op, right } => write!(f, "{left} {op} {right}"),
            Predicate::Exists {
                association,
                filter,
            } => write!(f, "EXISTS({} WHERE {filter})", association.name),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{part}")?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn sample() -> Predicate {
        Predicate::eq("specimen", true)
    }

    // =========================================================================
    // Smart constructors
    // =========================================================================

    #[test]
    fn and_absorbs_constants() {
        assert_eq!(Predicate::and(Vec::<Predicate>::new()), Predicate::True);
        assert_eq!(Predicate::and([Predicate::True, sample()]), sample());
        assert_eq!(Predicate::and([sample(), Predicate::False]), Predicate::False);
    }

    #[test]
    fn or_absorbs_constants() {
        assert_eq!(Predicate::or(Vec::<Predicate>::new()), Predicate::False);
        assert_eq!(Predicate::or([Predicate::False, sample()]), sample());
        assert_eq!(Predicate::or([sample(), Predicate::True]), Predicate::True);
    }

    #[test]
    fn nested_conjunctions_flatten() {
        let a = Predicate::is_null("notes");
        let nested = Predicate::and([Predicate::and([sample(), a.clone()]), sample()]);
        assert_eq!(nested, Predicate::And(vec![sample(), a, sample()]));
    }

    #[test]
    fn double_negation_cancels() {
        assert_eq!(Predicate::not(Predicate::not(sample())), sample());
        assert_eq!(Predicate::not(Predicate::True), Predicate::False);
    }

    #[test]
    fn empty_set_is_false() {
        assert_eq!(Predicate::in_set("id", Vec::<i64>::new()), Predicate::False);
    }

    #[test]
    fn exists_of_false_is_false() {
        let assoc = schema::association(RecordType::Location, "observations").unwrap();
        assert_eq!(Predicate::exists(assoc, Predicate::False), Predicate::False);
        assert!(Predicate::exists(assoc, Predicate::True).has_exists());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[test]
    fn touched_types_follow_joins() {
        let images = schema::association(RecordType::Observation, "images").unwrap();
        let pred = Predicate::and([sample(), Predicate::exists(images, Predicate::True)]);
        let types = pred.touched_types(RecordType::Observation);
        assert!(types.contains(&RecordType::Observation));
        assert!(types.contains(&RecordType::Image));
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn display_reads_like_sql() {
        let pred = Predicate::and([
            Predicate::compare(Column::Part("when", DatePart::Year), Op::Gte, 2005),
            Predicate::not_null("thumb_image_id"),
            Predicate::like("where", "%dobbs%"),
        ]);
        assert_eq!(
            pred.to_string(),
            "(YEAR(when) >= 2005 AND thumb_image_id IS NOT NULL AND where LIKE '%dobbs%')"
        );
    }
}
