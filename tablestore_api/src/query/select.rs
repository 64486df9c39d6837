use url::Url;

use super::common::{append_filters, Filter, Query, SortDirection};

/// Builder for `GET /{table}` reads.
#[derive(Clone, Debug, Default)]
pub struct SelectQuery {
    /// Columns to return. Empty selects every column.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query for SelectQuery {
    fn filters_mut(&mut self) -> &mut Vec<Filter> {
        &mut self.filters
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };
        url.query_pairs_mut().append_pair("select", &columns);

        append_filters(&mut url, &self.filters);

        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, direction)| format!("{}.{}", column, direction))
                .collect::<Vec<_>>()
                .join(",");
            url.query_pairs_mut().append_pair("order", &order);
        }
        if let Some(limit) = self.limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        if let Some(offset) = self.offset {
            url.query_pairs_mut()
                .append_pair("offset", &offset.to_string());
        }
        url
    }
}

impl SelectQuery {
    /// Selects the given columns only.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, column: &str, direction: SortDirection) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}
