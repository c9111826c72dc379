//! B-mode image assembly
use echo_dsp::Column;
use heapless::Vec;

/// Where an appended column landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Column index in the image.
    pub index: usize,
    /// The column was the last one; the cursor is back at 0.
    pub wrapped: bool,
}

/// Columns of `R` rows accumulated left to right, at most `C` of them.
///
/// After the last column the cursor wraps and further columns overwrite the image in place.
/// Whether to clear it first is up to the caller.
pub struct Image<const R: usize, const C: usize> {
    columns: Vec<Column<R>, C>,
    cursor: usize,
}

impl<const R: usize, const C: usize> Default for Image<R, C> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            cursor: 0,
        }
    }
}

impl<const R: usize, const C: usize> Image<R, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next column will be written to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Columns written so far, leftmost first.
    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column<R>> {
        self.columns.get(index)
    }

    /// Every column has been written at least once.
    pub fn is_full(&self) -> bool {
        self.columns.is_full()
    }

    /// Write a fully demodulated column at the cursor and advance it.
    pub fn append(&mut self, column: Column<R>) -> Placement {
        let index = self.cursor;
        match self.columns.get_mut(index) {
            Some(slot) => *slot = column,
            // The cursor never passes the written columns, and it is below `C`.
            None => {
                self.columns.push(column).ok();
            }
        }

        self.cursor += 1;
        let wrapped = self.cursor >= C;
        if wrapped {
            self.cursor = 0;
        }

        Placement { index, wrapped }
    }

    /// Discard all columns.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.cursor = 0;
    }
}
