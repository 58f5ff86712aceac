use std::fmt;

/// A cursor or selection on the editing surface.
///
/// Always normalized: `start <= end`. A collapsed cursor has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CursorRange {
    start: usize,
    end: usize,
}

impl CursorRange {
    /// Creates a range, swapping the bounds if they are reversed.
    ///
    /// # Example
    /// ```
    /// use imehost::CursorRange;
    ///
    /// let r = CursorRange::new(7, 3);
    /// assert_eq!((r.start(), r.end()), (3, 7));
    /// ```
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Creates a collapsed cursor at `pos`.
    #[inline]
    pub fn collapsed(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Length of the selection.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Shifts both bounds by signed offsets, saturating at zero, then normalizes.
    ///
    /// # Example
    /// ```
    /// use imehost::CursorRange;
    ///
    /// assert_eq!(CursorRange::new(2, 4).offset(1, -5), CursorRange::new(0, 3));
    /// ```
    #[inline]
    pub fn offset(self, d_start: isize, d_end: isize) -> Self {
        Self::new(
            self.start.saturating_add_signed(d_start),
            self.end.saturating_add_signed(d_end),
        )
    }
}

impl From<(usize, usize)> for CursorRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self::new(start, end)
    }
}

impl fmt::Display for CursorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}
