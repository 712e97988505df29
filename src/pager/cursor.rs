//! Pager Binding
//!
//! Cursor state for one bound page list. Pure bookkeeping, no I/O.

use super::PageNumber;

/// The cursor of a pager bound to one entry's page list
///
/// While `at_end` is false the cursor addresses
/// `(pages[index], unit)`. Once the last unit of the last page is passed the
/// cursor is parked at `(0, 0)` with `at_end` set.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pages: Vec<PageNumber>,
    index: usize,
    unit: usize,
    at_end: bool,
}

impl Binding {
    pub(crate) fn new(pages: Vec<PageNumber>) -> Self {
        let at_end = pages.is_empty();
        Self {
            pages,
            index: 0,
            unit: 0,
            at_end,
        }
    }

    pub(crate) fn pages(&self) -> &[PageNumber] {
        &self.pages
    }

    pub(crate) fn at_end(&self) -> bool {
        self.at_end
    }

    /// Total addressable units in the bound list
    pub(crate) fn total_units(&self, page_size: usize) -> usize {
        self.pages.len() * page_size
    }

    /// Units between the cursor and the end of the list
    pub(crate) fn remaining(&self, page_size: usize) -> usize {
        self.total_units(page_size) - self.offset(page_size)
    }

    /// Relative unit offset from the start of the list
    pub(crate) fn offset(&self, page_size: usize) -> usize {
        if self.at_end {
            self.total_units(page_size)
        } else {
            self.index * page_size + self.unit
        }
    }

    /// `(page number, unit within page)` under the cursor
    pub(crate) fn current(&self) -> Option<(PageNumber, usize)> {
        if self.at_end {
            None
        } else {
            Some((self.pages[self.index], self.unit))
        }
    }

    /// Step one unit forward, hopping pages. Returns true when the end is reached.
    pub(crate) fn advance(&mut self, page_size: usize) -> bool {
        if self.at_end {
            return true;
        }
        self.unit += 1;
        if self.unit == page_size {
            self.unit = 0;
            self.index += 1;
            if self.index == self.pages.len() {
                self.park();
            }
        }
        self.at_end
    }

    /// Move to a relative unit offset. `offset == total` parks at the end.
    pub(crate) fn seek(&mut self, offset: usize, page_size: usize) -> bool {
        let total = self.total_units(page_size);
        if offset > total {
            return false;
        }
        if offset == total {
            self.park();
        } else {
            self.index = offset / page_size;
            self.unit = offset % page_size;
            self.at_end = false;
        }
        true
    }

    fn park(&mut self) {
        self.index = 0;
        self.unit = 0;
        self.at_end = true;
    }
}
