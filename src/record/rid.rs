use crate::file::PageId;
use serde::Serialize;
use std::fmt;

/// Slot identifier within a page
pub type SlotId = usize;

/// Physical identifier for a record (page + slot)
///
/// Ordering is page-major, slot-minor, which is also scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rid {
    pub page_no: PageId,
    pub slot_no: SlotId,
}

impl Rid {
    pub fn new(page_no: PageId, slot_no: SlotId) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_order_is_page_major() {
        let mut rids = vec![Rid::new(1, 0), Rid::new(0, 5), Rid::new(0, 1), Rid::new(2, 0)];
        rids.sort();
        assert_eq!(
            rids,
            vec![Rid::new(0, 1), Rid::new(0, 5), Rid::new(1, 0), Rid::new(2, 0)]
        );
    }

    #[test]
    fn test_rid_display() {
        assert_eq!(Rid::new(3, 14).to_string(), "(3, 14)");
    }
}
