//! Sweep tests for the rational encoder's precision guarantees

use mapillary_sequence_downloader::exif::Rational;

/// Decoding the encoder's output reproduces the input within half a grid
/// step of the bound, and the denominator never exceeds the bound - across
/// the whole coordinate domain.
#[test]
fn encoder_respects_bound_and_error_across_coordinate_domain() {
    let bounds = [1u64, 3, 10, 101, 9_973, 1_000_000, 10_000_000];

    // Degree grid over [-180, 180] with awkward fractional parts.
    let mut values = Vec::new();
    let mut d = -180.0f64;
    while d <= 180.0 {
        values.push(d);
        values.push(d + 0.123456789);
        values.push(d + 0.5);
        values.push(d + 0.999999);
        d += 7.3;
    }

    for &value in &values {
        for &bound in &bounds {
            let r = Rational::approximate(value, bound).unwrap();
            assert!(r.denominator > 0, "denominator must stay positive");
            assert!(
                (r.denominator as u64) <= bound,
                "denominator {} exceeds bound {bound} for value {value}",
                r.denominator
            );

            let err = (value - r.to_f64()).abs();
            let max_err = 1.0 / (2.0 * bound as f64) + 1e-9;
            assert!(
                err <= max_err,
                "error {err} above {max_err} for value {value} at bound {bound}"
            );

            // Sign must survive encoding.
            if r.numerator != 0 {
                assert_eq!(r.numerator < 0, value < 0.0);
            }
        }
    }
}

/// The encoder beats the fixed 1/100 grid that coarse schemes use: for GPS
/// seconds the round-trip error stays below 0.0002 m while 1/100 encoding
/// cannot do better than about 0.15 m worst case.
#[test]
fn encoder_outperforms_fixed_centisecond_grid() {
    const METERS_PER_ARCSECOND: f64 = 30.9;
    let seconds_values = [0.004999, 12.345678, 29.999999, 46.44, 59.995001];

    for &seconds in &seconds_values {
        let precise = Rational::approximate(seconds, 10_000_000).unwrap();
        let err_m = (seconds - precise.to_f64()).abs() * METERS_PER_ARCSECOND;
        assert!(err_m < 0.0002, "{seconds}: error {err_m} m");

        let fixed_err_m =
            (seconds - (seconds * 100.0).trunc() / 100.0).abs() * METERS_PER_ARCSECOND;
        assert!(
            err_m <= fixed_err_m + 1e-12,
            "{seconds}: best-rational must never lose to the fixed grid"
        );
    }
}
