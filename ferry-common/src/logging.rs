use std::str::FromStr;

use tracing::{Subscriber, metadata::LevelFilter};
use tracing_subscriber::{
    Layer,
    filter::FilterFn,
    fmt::{MakeWriter, time::ChronoUtc},
    prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::ConfigurationError;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Content leaving this process towards the broker or the bulk store
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Content arriving from the broker or the bulk store
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Settings for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub ansi: bool,
}

impl LogSettings {
    /// Read the level from `LOG_LEVEL`. When unset, debug builds log
    /// everything and release builds log `INFO` and above.
    ///
    /// # Errors
    ///
    /// Fails when `LOG_LEVEL` names no level.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::parse(std::env::var("LOG_LEVEL").ok().as_deref())
    }

    fn parse(level: Option<&str>) -> Result<Self, ConfigurationError> {
        let level = match level {
            Some(level) => LevelFilter::from_str(level.trim()).map_err(|_| {
                ConfigurationError::invalid("LOG_LEVEL", format!("unknown level {level:?}"))
            })?,
            None if cfg!(debug_assertions) => LevelFilter::TRACE,
            None => LevelFilter::INFO,
        };

        Ok(Self { level, ansi: true })
    }
}

/// Compact, RFC 3339 timestamped output of `ferry*` events at or above the
/// configured level.
pub fn layer<S, W>(settings: LogSettings, writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(settings.ansi)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer)
        .with_filter(settings.level)
        .with_filter(FilterFn::new(|metadata| {
            metadata.target().starts_with("ferry")
        }))
}

/// Install the global subscriber, writing to stdout.
///
/// # Errors
///
/// Fails when `LOG_LEVEL` is invalid or a global subscriber is already set.
pub fn init() -> Result<(), ConfigurationError> {
    let settings = LogSettings::from_env()?;

    tracing_subscriber::registry()
        .with(layer(settings, std::io::stdout))
        .try_init()
        .map_err(|err| ConfigurationError::invalid("logging", err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(
            LogSettings::parse(Some("warn")).unwrap().level,
            LevelFilter::WARN
        );
        assert_eq!(
            LogSettings::parse(Some(" DEBUG ")).unwrap().level,
            LevelFilter::DEBUG
        );

        let err = LogSettings::parse(Some("loud")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for LOG_LEVEL: unknown level \"loud\""
        );

        let expected = if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        };
        assert_eq!(LogSettings::parse(None).unwrap().level, expected);
    }

    #[test]
    fn test_layer_keeps_ferry_events_at_level() {
        let captured = Captured::default();
        let writer = {
            let captured = captured.clone();
            move || captured.clone()
        };
        let settings = LogSettings {
            level: LevelFilter::DEBUG,
            ansi: false,
        };

        let subscriber = tracing_subscriber::registry().with(layer(settings, writer));
        tracing::subscriber::with_default(subscriber, || {
            crate::incoming!(level = INFO, "message {} arrived", "m-1");
            crate::internal!("cycle details");
            tracing::info!(target: "broker_client", "foreign event");
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("message m-1 arrived"), "{output}");
        assert!(!output.contains("cycle details"), "{output}");
        assert!(!output.contains("foreign event"), "{output}");
    }

    #[test]
    fn test_init_installs_once() {
        init().unwrap();
        assert!(init().is_err());
    }
}
