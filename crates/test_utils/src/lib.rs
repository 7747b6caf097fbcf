//! Test utilities to be used in the talk loader crates.

#![deny(missing_docs)]

pub mod fetcher;
pub mod id;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Repeatedly run a block until it `break`s, sleeping between attempts.
/// Panics if the block has not broken out within the timeout.
///
/// The macro evaluates to the value passed to `break`.
///
/// ```ignore
/// iter_check!(1000, {
///     if fetcher.pending_count(&id) == 1 {
///         break;
///     }
/// });
/// ```
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:expr, $sleep_ms:expr, $code:block) => {
        ::tokio::time::timeout(
            ::std::time::Duration::from_millis($timeout_ms),
            async {
                loop {
                    $code;
                    ::tokio::time::sleep(::std::time::Duration::from_millis(
                        $sleep_ms,
                    ))
                    .await;
                }
            },
        )
        .await
        .expect("iter_check timed out")
    };

    ($timeout_ms:expr, $code:block) => {
        $crate::iter_check!($timeout_ms, 1, $code)
    };

    ($code:block) => {
        $crate::iter_check!(5000, $code)
    };
}
