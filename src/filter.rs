//! Flag-based record filtering.

/// Returns whether a record with `flags` survives the required and forbidden masks
///
/// A non-zero `required` mask needs at least one of its bits set in `flags`; any bit of
/// a non-zero `forbidden` mask present in `flags` rejects the record. Zero masks do not
/// filter anything.
#[inline]
#[must_use]
pub fn passes(flags: u16, required: u16, forbidden: u16) -> bool {
    if required != 0 && flags & required == 0 {
        return false;
    }
    if forbidden != 0 && flags & forbidden != 0 {
        return false;
    }
    true
}

/// Required and forbidden flag masks applied to converted records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagFilter {
    pub required: u16,
    pub forbidden: u16,
}
impl FlagFilter {
    #[must_use]
    pub fn new(required: u16, forbidden: u16) -> Self {
        Self {
            required,
            forbidden,
        }
    }

    /// True when neither mask is set, so every record passes
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.required == 0 && self.forbidden == 0
    }

    #[inline]
    #[must_use]
    pub fn passes(&self, flags: u16) -> bool {
        passes(flags, self.required, self.forbidden)
    }
}
