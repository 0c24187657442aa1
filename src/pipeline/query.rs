//! Search-query construction.

use chrono::{DateTime, Utc};

use crate::mailbox::SearchQuery;
use crate::pipeline::types::IngestionRequest;

/// Build the provider query for a request at `now`.
///
/// Grammar: `(to:<addr> OR from:<addr>) after:<epoch>[ is:unread]`, where
/// `epoch` is `now - window` in whole seconds, clamped to 0 when the
/// subtraction leaves the calendar.
pub fn build_query(request: &IngestionRequest, now: DateTime<Utc>) -> SearchQuery {
    let after = now
        .checked_sub_signed(request.window())
        .map_or(0, |start| start.timestamp());
    let address = request.address();
    let mut query = format!("(to:{address} OR from:{address}) after:{after}");
    if !request.is_include_read() {
        query.push_str(" is:unread");
    }
    SearchQuery::new(query)
}
