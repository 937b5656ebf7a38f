//! Log output for the tail binary.
//!
//! `RUST_LOG` adds directives on top of the defaults below. Library code only
//! emits events; installing a subscriber is left to binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const BASE_DIRECTIVES: [&str; 4] = [
    "location_stream_client=info",
    "location_stream_tail=info",
    "hyper=warn",
    "reqwest=warn",
];

/// Install the global fmt subscriber.
///
/// Does nothing if a subscriber is already installed.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init();
}

fn env_filter() -> EnvFilter {
    BASE_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}
