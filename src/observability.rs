use biometrics::{Collector, Counter, Moments};

pub(crate) static AUTH_REQUESTS: Counter = Counter::new("parlor.auth.requests");
pub(crate) static AUTH_ERRORS: Counter = Counter::new("parlor.auth.errors");

pub(crate) static QUERY_REQUESTS: Counter = Counter::new("parlor.query.requests");
pub(crate) static QUERY_ERRORS: Counter = Counter::new("parlor.query.errors");
pub(crate) static INSERT_REQUESTS: Counter = Counter::new("parlor.insert.requests");
pub(crate) static INSERT_ERRORS: Counter = Counter::new("parlor.insert.errors");
pub(crate) static QUERY_DURATION: Moments = Moments::new("parlor.query.duration_seconds");

pub(crate) static FEED_SUBSCRIBES: Counter = Counter::new("parlor.feed.subscribes");
pub(crate) static FEED_EVENTS: Counter = Counter::new("parlor.feed.events");
pub(crate) static FEED_ERRORS: Counter = Counter::new("parlor.feed.errors");
pub(crate) static FEED_BYTES: Counter = Counter::new("parlor.feed.bytes");

pub(crate) static UPLOAD_REQUESTS: Counter = Counter::new("parlor.upload.requests");
pub(crate) static UPLOAD_ERRORS: Counter = Counter::new("parlor.upload.errors");
pub(crate) static UPLOAD_REJECTS: Counter = Counter::new("parlor.upload.rejects");
pub(crate) static UPLOAD_BYTES: Counter = Counter::new("parlor.upload.bytes");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&AUTH_REQUESTS);
    collector.register_counter(&AUTH_ERRORS);

    collector.register_counter(&QUERY_REQUESTS);
    collector.register_counter(&QUERY_ERRORS);
    collector.register_counter(&INSERT_REQUESTS);
    collector.register_counter(&INSERT_ERRORS);
    collector.register_moments(&QUERY_DURATION);

    collector.register_counter(&FEED_SUBSCRIBES);
    collector.register_counter(&FEED_EVENTS);
    collector.register_counter(&FEED_ERRORS);
    collector.register_counter(&FEED_BYTES);

    collector.register_counter(&UPLOAD_REQUESTS);
    collector.register_counter(&UPLOAD_ERRORS);
    collector.register_counter(&UPLOAD_REJECTS);
    collector.register_counter(&UPLOAD_BYTES);
}
