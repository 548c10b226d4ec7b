use crate::util::constants::MAX_HUB_HOPS_LIMIT;
use crate::util::log::warn;
use std::default::Default;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Which remote heap scheme to use for the attached VM.
///
/// Each variant names one collector algorithm. The collector identifiers reported by the
/// target (the simple name of its configured heap scheme class) are mapped onto these variants
/// by [`HeapSchemeSelector::from_collector_name`], which is a compile-time table rather than a
/// name-concatenation lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
pub enum HeapSchemeSelector {
    /// Pick the scheme from the collector name reported by the target.
    Auto,
    /// Simple two-space copying collector.
    SemiSpace,
    /// Non-aging nursery evacuated into a semispace old generation.
    GenSemiSpace,
    /// Non-moving mark-sweep over one contiguous space.
    MarkSweep,
    /// Non-moving mark-sweep over a table of fixed-size regions.
    RegionMarkSweep,
    /// Copying nursery promoted into a non-moving mark-sweep old generation.
    GenMarkSweep,
    /// A collector this crate has no model for.
    Unknown,
}

impl HeapSchemeSelector {
    /// Map the collector identifier reported by the target to a scheme. Returns `Unknown` for
    /// collectors without a remote model.
    pub fn from_collector_name(name: &str) -> HeapSchemeSelector {
        match name {
            "SemiSpaceHeapScheme" => HeapSchemeSelector::SemiSpace,
            "GenSSHeapScheme" => HeapSchemeSelector::GenSemiSpace,
            "MSHeapScheme" => HeapSchemeSelector::MarkSweep,
            "MSEHeapScheme" => HeapSchemeSelector::RegionMarkSweep,
            "GenMSEHeapScheme" => HeapSchemeSelector::GenMarkSweep,
            _ => HeapSchemeSelector::Unknown,
        }
    }
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Inspector options. Each option can be set programmatically with
        /// [`Options::set_from_str`] or through an environment variable named after the option
        /// with the prefix [`Options::ENV_PREFIX`] (e.g. `TELE_HEAP_MAX_HUB_HOPS=4`).
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Prefix of environment variables read by [`Options::default`].
            pub const ENV_PREFIX: &'static str = "TELE_HEAP_";

            /// Set an option by name. Returns false, keeping the current value, if the name is
            /// unknown or the value cannot be parsed or fails validation.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_from_str()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Options with their built-in defaults, ignoring the environment.
            pub fn new_without_env() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Apply every `TELE_HEAP_*` variable in the given iterator.
            pub fn read_env_var_settings<I: IntoIterator<Item = (String, String)>>(&mut self, vars: I) {
                for (key, val) in vars {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(Self::ENV_PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Self::new_without_env();
                // If we have env vars that start with TELE_HEAP_ and match any option (such as TELE_HEAP_MAX_HUB_HOPS),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                options.read_env_var_settings(std::env::vars());
                options
            }
        }
    ]
}

options! {
    // Force a heap scheme instead of using the collector name reported by the target.
    heap_scheme:             HeapSchemeSelector [always_valid] = HeapSchemeSelector::Auto,
    // Origin-relative offset of the hub (type descriptor) word in every object header.
    hub_offset:              usize              [|v: &usize| *v % crate::util::constants::BYTES_IN_WORD == 0] = 0,
    // Offset from the start of an object cell to its origin, used to decode forwarding pointers.
    origin_offset:           usize              [|v: &usize| *v % crate::util::constants::BYTES_IN_WORD == 0] = 0,
    // Low-bit tag that marks a hub word as a forwarding pointer.
    forwarding_tag:          usize              [|v: &usize| *v != 0 && *v < crate::util::constants::BYTES_IN_WORD] = 1,
    // How many hub hops the plausible-origin heuristic follows before giving up.
    max_hub_hops:            usize              [|v: &usize| *v > 0 && *v <= MAX_HUB_HOPS_LIMIT] = 3,
    // Drop map entries no client holds at the end of every update pass.
    sweep_unreferenced:      bool               [always_valid] = true,
    // Log reference reconciliation summaries at INFO instead of DEBUG.
    trace_reference_updates: bool               [always_valid] = false,
}

impl FromStr for Options {
    type Err = String;

    /// Parse a comma separated `name=value` list, e.g. `max_hub_hops=4,sweep_unreferenced=false`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Options::new_without_env();
        for pair in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Expected name=value, found {:?}", pair))?;
            if !options.set_from_str(name.trim(), value.trim()) {
                return Err(format!("Invalid option {:?}", pair));
            }
        }
        Ok(options)
    }
}
