use crate::SbError;

/// Floating point type used throughout the interlocking.
pub type Real = f64;

/// Reject NaN/infinite inputs at the load boundary.
pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, SbError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(SbError::NonFinite { what, value: v })
    }
}

/// Like [`ensure_finite`] but also rejects negative values (lengths, offsets).
pub fn ensure_non_negative(v: Real, what: &'static str) -> Result<Real, SbError> {
    let v = ensure_finite(v, what)?;
    if v < 0.0 {
        return Err(SbError::InvalidArg { what });
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_values_pass() {
        assert_eq!(ensure_finite(12.5, "length").unwrap(), 12.5);
        assert!(matches!(
            ensure_finite(f64::NAN, "length"),
            Err(SbError::NonFinite { .. })
        ));
    }

    #[test]
    fn negative_rejected() {
        assert!(ensure_non_negative(0.0, "offset").is_ok());
        assert!(matches!(
            ensure_non_negative(-1.0, "offset"),
            Err(SbError::InvalidArg { what: "offset" })
        ));
    }
}
