use std::str::FromStr;

use tracing::{Level, event, info, warn};

/// Level used to report a constant that kept its default value.
pub const INFORMATION_LOG_LEVEL: Level = Level::DEBUG;

/// Controls how a configuration value is parsed from an environment string.
pub trait ParsableConfigValue: std::fmt::Debug + Sized {
    fn parse_user_value(value: &str) -> Option<Self>;

    /// Parse the value, returning the default if it is absent or can't be parsed.
    /// A value that is present but unparsable is reported with a warning.
    fn parse(variable_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(v) => match Self::parse_user_value(&v) {
                Some(v) => {
                    info!("Config: {variable_name} = {v:?} (user set)");
                    v
                },
                None => {
                    warn!(
                        "Configuration value {v} for {variable_name} cannot be parsed into correct type; reverting to default."
                    );
                    info!("Config: {variable_name} = {default:?} (default due to parse error)");
                    default
                },
            },
            None => {
                event!(INFORMATION_LOG_LEVEL, "Config: {variable_name} = {default:?} (default)");
                default
            },
        }
    }
}

/// Types whose `FromStr` implementation is the right parser for user input.
pub trait FromStrParseable: FromStr + std::fmt::Debug {}

impl<T: FromStrParseable> ParsableConfigValue for T {
    fn parse_user_value(value: &str) -> Option<Self> {
        value.trim().parse::<T>().ok()
    }
}

impl FromStrParseable for usize {}
impl FromStrParseable for u32 {}
impl FromStrParseable for u64 {}
impl FromStrParseable for i64 {}
impl FromStrParseable for f64 {}
impl FromStrParseable for String {}

/// Lenient boolean parsing:
/// - true: "1","true","yes","y","on"
/// - false: "0","false","no","n","off",""
pub fn parse_bool_value(value: &str) -> Option<bool> {
    let t = value.trim().to_ascii_lowercase();

    match t.as_str() {
        "0" | "false" | "no" | "n" | "off" | "" => Some(false),
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        _ => None,
    }
}

impl ParsableConfigValue for bool {
    fn parse_user_value(value: &str) -> Option<Self> {
        parse_bool_value(value)
    }
}

/// `None` unless the user gives a value.
impl<T: ParsableConfigValue> ParsableConfigValue for Option<T> {
    fn parse_user_value(value: &str) -> Option<Self> {
        T::parse_user_value(value).map(Some)
    }
}

/// Durations accept suffixed values such as "250ms", "2s" or "1m".
impl ParsableConfigValue for std::time::Duration {
    fn parse_user_value(value: &str) -> Option<Self> {
        duration_str::parse(value.trim()).ok()
    }
}

// Reexport this so that dependencies don't need lazy_static themselves.
pub use lazy_static::lazy_static;

/// Declares constants that can be overridden through `XFER_<NAME>` environment variables.
///
/// Overrides are only honored in debug builds; release builds always use the default.
#[macro_export]
macro_rules! configurable_constants {
    ($(
        $(#[$meta:meta])*
        ref $name:ident : $type:ty = $value:expr;
    )+) => {
        $(
            #[allow(unused_imports)]
            use $crate::configuration_utils::*;

            lazy_static! {
                $(#[$meta])*
                pub static ref $name: $type = {
                    #[cfg(debug_assertions)]
                    {
                        let default_value = $value;
                        let maybe_env_value = std::env::var(concat!("XFER_", stringify!($name))).ok();
                        <$type>::parse(stringify!($name), maybe_env_value, default_value)
                    }
                    #[cfg(not(debug_assertions))]
                    {
                        $value
                    }
                };
            }
        )+
    };
}

pub use ctor as ctor_reexport;

#[cfg(not(doctest))]
/// A macro for **tests** that sets `XFER_<CONSTANT_NAME>` to `$value` **before** the
/// constant is first read, then checks that the constant picked up the value. Panics if
/// the constant was already initialized with something else.
///
/// # Example
/// ```rust
/// use utils::{configurable_constants, test_set_constants};
/// configurable_constants! {
///    /// How often to poll.
///    ref POLL_MILLIS: u64 = 100;
/// }
///
/// test_set_constants! {
///    POLL_MILLIS = 5;
/// }
/// assert_eq!(*POLL_MILLIS, 5);
/// ```
#[macro_export]
macro_rules! test_set_constants {
    ($(
        $var_name:ident = $val:expr;
    )+) => {
        use $crate::configuration_utils::ctor_reexport as ctor;

        #[ctor::ctor]
        fn set_constants_on_load() {
            $(
                let val = $val;
                let val_str = format!("{val:?}");

                let env_name = concat!("XFER_", stringify!($var_name));

                #[allow(unused_unsafe)]
                unsafe {
                    std::env::set_var(env_name, &val_str);
                }

                // Force lazy_static to be read now.
                let actual_value = *$var_name;

                if format!("{actual_value:?}") != val_str {
                    panic!(
                        "test_set_constants! failed: wanted {} to be {:?}, but got {:?}",
                        stringify!($var_name),
                        val,
                        actual_value
                    );
                }
                eprintln!("> Set {} to {:?}", stringify!($var_name), val);
            )+
        }
    }
}
