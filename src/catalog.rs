//! Static syringe catalog.
//!
//! Maps a syringe's display name to its bore diameter in millimeters, kept
//! as the exact string the pump firmware expects for the diameter command.
//! Pure configuration data; the coordinator never derives diameters.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// The fixed syringe models this fleet is calibrated for.
///
/// Diameters are device-format strings, not floats: the pump echoes the
/// programmed value back verbatim and the confirmation round-trip compares
/// display text.
pub const SYRINGES: [(&str, &str); 6] = [
    ("1 ml BD", "4.699"),
    ("3 ml BD", "8.585"),
    ("5 ml BD", "11.99"),
    ("10 ml BD", "14.60"),
    ("30 ml BD", "21.59"),
    ("Freeman", "50.00"),
];

static BY_NAME: Lazy<BTreeMap<&'static str, &'static str>> =
    Lazy::new(|| SYRINGES.iter().copied().collect());

/// Look up the bore diameter for a catalog syringe.
///
/// Returns `None` only when the name is not a catalog entry, which is a
/// programmer error if the name came from a validated selection list.
pub fn diameter_of(name: &str) -> Option<&'static str> {
    BY_NAME.get(name.trim()).copied()
}

/// Catalog names in display order, for building selection lists.
pub fn names() -> impl Iterator<Item = &'static str> {
    BY_NAME.keys().copied()
}

/// The default selection for a freshly discovered pump: the first catalog
/// entry in display order.
pub fn default_syringe() -> &'static str {
    SYRINGES[0].0
}
