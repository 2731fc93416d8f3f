use crate::error::{Result, SearchIndexError};
use crate::index::schema::{DateField, FieldSet, IdentityField, KeywordField};
use crate::tokenizer::content_terms;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Bound;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, RegexQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;
use uuid::Uuid;

/// Lowercased lifecycle state name, e.g. `incomplete`, `complete`, `expired`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StatusId(String);

impl StatusId {
    pub const EXPIRED: &'static str = "expired";

    pub fn new(s: &str) -> Self {
        StatusId(s.trim().to_lowercase())
    }

    pub fn expired() -> Self {
        StatusId(Self::EXPIRED.to_string())
    }

    pub fn is_expired(&self) -> bool {
        self.0 == Self::EXPIRED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StatusId {
    fn from(s: String) -> Self {
        StatusId::new(&s)
    }
}

impl From<&str> for StatusId {
    fn from(s: &str) -> Self {
        StatusId::new(s)
    }
}

impl From<StatusId> for String {
    fn from(s: StatusId) -> Self {
        s.0
    }
}

/// Ticks window on one date field. `after` is inclusive, `before` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub field: DateField,
    pub after: Option<i64>,
    pub before: Option<i64>,
}

/// One filter dimension.
///
/// Filters of the same kind are OR'd (any of these organisations, any of
/// these search terms); different kinds are AND'd. `DateRange` and
/// `FullText` filters are always AND'd, even with each other.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Status(BTreeSet<StatusId>),
    SearchTerm(String),
    OrganisationId(Uuid),
    ProductId(Uuid),
    CustomerId(Uuid),
    TenantId(Uuid),
    QuoteId(Uuid),
    DateRange(DateRange),
    FullText(String),
    TestDataInclusion(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: DateField,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Sort {
            field: DateField::LastModifiedAt,
            order: SortOrder::Desc,
        }
    }
}

/// Caller-facing filter object. Empty collections apply no restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub statuses: BTreeSet<StatusId>,
    pub search_terms: Vec<String>,
    pub organisation_ids: Vec<Uuid>,
    pub product_ids: Vec<Uuid>,
    pub customer_ids: Vec<Uuid>,
    pub quote_ids: Vec<Uuid>,
    pub include_test_data: bool,
    pub date_range: Option<DateRange>,
    pub full_text: Option<String>,
    pub sort: Sort,
    /// 1-based.
    pub page: usize,
    /// `None` takes the configured default.
    pub page_size: Option<usize>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        SearchFilters {
            statuses: BTreeSet::new(),
            search_terms: Vec::new(),
            organisation_ids: Vec::new(),
            product_ids: Vec::new(),
            customer_ids: Vec::new(),
            quote_ids: Vec::new(),
            include_test_data: false,
            date_range: None,
            full_text: None,
            sort: Sort::default(),
            page: 1,
            page_size: None,
        }
    }
}

impl SearchFilters {
    pub fn with_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StatusId>,
    {
        self.statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if !self.statuses.is_empty() {
            filters.push(Filter::Status(self.statuses.clone()));
        }
        filters.extend(self.search_terms.iter().cloned().map(Filter::SearchTerm));
        filters.extend(self.organisation_ids.iter().copied().map(Filter::OrganisationId));
        filters.extend(self.product_ids.iter().copied().map(Filter::ProductId));
        filters.extend(self.customer_ids.iter().copied().map(Filter::CustomerId));
        filters.extend(self.quote_ids.iter().copied().map(Filter::QuoteId));
        if let Some(range) = self.date_range {
            filters.push(Filter::DateRange(range));
        }
        if let Some(text) = &self.full_text {
            filters.push(Filter::FullText(text.clone()));
        }
        filters.push(Filter::TestDataInclusion(self.include_test_data));
        filters
    }
}

/// Compiles typed filters into one tantivy query.
pub struct FilterCompiler {
    fields: FieldSet,
    min_gram: usize,
    max_gram: usize,
}

impl FilterCompiler {
    const MAX_BOOLEAN_CLAUSES: usize = 1000;

    pub fn new(fields: FieldSet, min_gram: usize, max_gram: usize) -> Self {
        FilterCompiler {
            fields,
            min_gram,
            max_gram,
        }
    }

    /// `now_ticks` pins the derived `expired` status for the whole query.
    pub fn compile(&self, filters: &[Filter], now_ticks: i64) -> Result<Box<dyn Query>> {
        let clause_count = count_clauses(filters);
        if clause_count > Self::MAX_BOOLEAN_CLAUSES {
            return Err(SearchIndexError::InvalidQuery(format!(
                "Filter has {} clauses, exceeds maximum {}",
                clause_count,
                Self::MAX_BOOLEAN_CLAUSES
            )));
        }

        let mut statuses: BTreeSet<StatusId> = BTreeSet::new();
        let mut has_status = false;
        let mut terms: Vec<Box<dyn Query>> = Vec::new();
        let mut keywords: Vec<(KeywordField, Vec<Box<dyn Query>>)> = Vec::new();
        let mut include_test_data = false;
        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Must, Box::new(AllQuery) as Box<dyn Query>)];

        for filter in filters {
            match filter {
                Filter::Status(set) => {
                    has_status |= !set.is_empty();
                    statuses.extend(set.iter().cloned());
                }
                Filter::SearchTerm(term) => {
                    if let Some(q) = self.search_term_query(term)? {
                        terms.push(q);
                    }
                }
                Filter::OrganisationId(id) => {
                    self.push_keyword(&mut keywords, KeywordField::OrganisationId, *id)
                }
                Filter::ProductId(id) => {
                    self.push_keyword(&mut keywords, KeywordField::ProductId, *id)
                }
                Filter::CustomerId(id) => {
                    self.push_keyword(&mut keywords, KeywordField::CustomerId, *id)
                }
                Filter::TenantId(id) => self.push_keyword(&mut keywords, KeywordField::TenantId, *id),
                Filter::QuoteId(id) => self.push_keyword(&mut keywords, KeywordField::QuoteId, *id),
                Filter::DateRange(range) => {
                    if let Some(q) = self.date_range_query(range)? {
                        clauses.push((Occur::Must, q));
                    }
                }
                Filter::FullText(text) => {
                    for token in content_terms(text) {
                        let token: String = token.chars().take(self.max_gram).collect();
                        clauses.push((
                            Occur::Must,
                            Box::new(TermQuery::new(
                                Term::from_field_text(self.fields.content, &token),
                                IndexRecordOption::Basic,
                            )),
                        ));
                    }
                }
                Filter::TestDataInclusion(include) => include_test_data = *include,
            }
        }

        if has_status {
            clauses.push((Occur::Must, self.status_query(&statuses, now_ticks)));
        }
        if !terms.is_empty() {
            clauses.push((Occur::Must, any_of(terms)));
        }
        for (_, queries) in keywords {
            clauses.push((Occur::Must, any_of(queries)));
        }
        if !include_test_data {
            clauses.push((
                Occur::MustNot,
                Box::new(TermQuery::new(
                    Term::from_field_bool(self.fields.is_test_data, true),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn push_keyword(
        &self,
        keywords: &mut Vec<(KeywordField, Vec<Box<dyn Query>>)>,
        field: KeywordField,
        id: Uuid,
    ) {
        let query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.keyword(field), &id.hyphenated().to_string()),
            IndexRecordOption::Basic,
        ));
        match keywords.iter_mut().find(|(f, _)| *f == field) {
            Some((_, queries)) => queries.push(query),
            None => keywords.push((field, vec![query])),
        }
    }

    fn expired_at(&self, now_ticks: i64) -> Box<dyn Query> {
        Box::new(RangeQuery::new(
            Bound::Unbounded,
            Bound::Included(Term::from_field_i64(
                self.fields.date(DateField::ExpiryAt),
                now_ticks,
            )),
        ))
    }

    /// `expired` is derived from the expiry date; every other state must be
    /// stored and not yet past its expiry.
    fn status_query(&self, statuses: &BTreeSet<StatusId>, now_ticks: i64) -> Box<dyn Query> {
        let mut any: Vec<Box<dyn Query>> = Vec::new();
        for status in statuses {
            if status.is_expired() {
                any.push(self.expired_at(now_ticks));
            } else {
                any.push(Box::new(BooleanQuery::new(vec![
                    (
                        Occur::Must,
                        Box::new(TermQuery::new(
                            Term::from_field_text(self.fields.state, status.as_str()),
                            IndexRecordOption::Basic,
                        )) as Box<dyn Query>,
                    ),
                    (Occur::MustNot, self.expired_at(now_ticks)),
                ])));
            }
        }
        any_of(any)
    }

    /// Case-insensitive substring match against number, name and email.
    fn search_term_query(&self, term: &str) -> Result<Option<Box<dyn Query>>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(None);
        }
        let len = term.chars().count();
        let mut any: Vec<Box<dyn Query>> = Vec::new();
        for identity in IdentityField::ALL {
            if (self.min_gram..=self.max_gram).contains(&len) {
                any.push(Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.identity(identity), &term),
                    IndexRecordOption::Basic,
                )));
            } else {
                let pattern = format!(".*{}.*", regex::escape(&term));
                let q = RegexQuery::from_pattern(&pattern, self.fields.identity_keyword(identity))
                    .map_err(|e| SearchIndexError::InvalidQuery(e.to_string()))?;
                any.push(Box::new(q));
            }
        }
        Ok(Some(any_of(any)))
    }

    fn date_range_query(&self, range: &DateRange) -> Result<Option<Box<dyn Query>>> {
        if let (Some(after), Some(before)) = (range.after, range.before) {
            if after >= before {
                return Err(SearchIndexError::InvalidQuery(format!(
                    "empty date range on {}: {} >= {}",
                    range.field.field_name(),
                    after,
                    before
                )));
            }
        }
        let field = self.fields.date(range.field);
        let lower = match range.after {
            Some(t) => Bound::Included(Term::from_field_i64(field, t)),
            None => Bound::Unbounded,
        };
        let upper = match range.before {
            Some(t) => Bound::Excluded(Term::from_field_i64(field, t)),
            None => Bound::Unbounded,
        };
        if matches!((&lower, &upper), (Bound::Unbounded, Bound::Unbounded)) {
            return Ok(None);
        }
        Ok(Some(Box::new(RangeQuery::new(lower, upper))))
    }
}

fn any_of(mut queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    if queries.len() == 1 {
        if let Some(q) = queries.pop() {
            return q;
        }
    }
    Box::new(BooleanQuery::new(
        queries.into_iter().map(|q| (Occur::Should, q)).collect(),
    ))
}

fn count_clauses(filters: &[Filter]) -> usize {
    filters
        .iter()
        .map(|f| match f {
            Filter::Status(set) => set.len().max(1),
            Filter::SearchTerm(_) => IdentityField::ALL.len(),
            Filter::FullText(text) => content_terms(text).len(),
            _ => 1,
        })
        .sum()
}
