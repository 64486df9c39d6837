use url::Url;

use super::common::{append_filters, Filter, Query};

/// Builder for `DELETE /{table}`. The client refuses to send one without filters.
#[derive(Clone, Debug, Default)]
pub struct DeleteQuery {
    pub filters: Vec<Filter>,
}

impl Query for DeleteQuery {
    fn filters_mut(&mut self) -> &mut Vec<Filter> {
        &mut self.filters
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        append_filters(&mut url, &self.filters);
        url
    }
}

impl DeleteQuery {
    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }
}
