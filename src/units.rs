//! Unit conversions into the canonical measurement units.
//!
//! Every conversion rounds its output to three decimal places so that a
//! value stored from Fahrenheit and a value stored from Celsius compare
//! equal when they describe the same temperature.

// ---

/// Round to three decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Fahrenheit to Celsius: `(f - 32) * 5/9`.
pub fn f_to_c(fahrenheit: f64) -> f64 {
    round3((fahrenheit - 32.0) * 5.0 / 9.0)
}

/// Pascal to hectopascal.
pub fn pa_to_hpa(pascal: f64) -> f64 {
    round3(pascal / 100.0)
}

/// Fraction (0..=1) to percent.
pub fn fraction_to_percent(fraction: f64) -> f64 {
    round3(fraction * 100.0)
}

/// Celsius to Fahrenheit, the inverse of [`f_to_c`].
pub fn c_to_f(celsius: f64) -> f64 {
    round3(celsius * 9.0 / 5.0 + 32.0)
}

/// Hectopascal to Pascal, the inverse of [`pa_to_hpa`].
pub fn hpa_to_pa(hectopascal: f64) -> f64 {
    round3(hectopascal * 100.0)
}

/// Percent to fraction, the inverse of [`fraction_to_percent`].
pub fn percent_to_fraction(percent: f64) -> f64 {
    round3(percent / 100.0)
}
