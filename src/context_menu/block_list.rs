use crate::ids::Clsid;
use std::collections::HashSet;

/// The shell's own "New" submenu handler. The menu layer supplies that
/// submenu itself through its new-item client.
pub const CLSID_NEW_MENU: Clsid = Clsid::from_u128(0xD969A300_E7FF_11D0_A93B_00A0C90F2719);

/// Context menu extensions that must never be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    entries: HashSet<Clsid>,
}

impl BlockList {
    pub fn new(entries: impl IntoIterator<Item = Clsid>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Builds a list from registry-style strings. Entries that do not parse
    /// are logged and skipped.
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Self {
        let entries = values
            .iter()
            .filter_map(|value| match value.as_ref().parse::<Clsid>() {
                Ok(clsid) => Some(clsid),
                Err(e) => {
                    tracing::warn!(target: "context_menu", "Ignoring block list entry: {}", e);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn contains(&self, clsid: &Clsid) -> bool {
        self.entries.contains(clsid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits `handlers` into the ones that may load, keeping their order.
    pub fn allowed(&self, handlers: Vec<Clsid>) -> Vec<Clsid> {
        handlers
            .into_iter()
            .filter(|handler| {
                let blocked = self.contains(handler);
                if blocked {
                    tracing::debug!(target: "context_menu", "Suppressing blocked extension {}", handler);
                }
                !blocked
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_strings_skips_garbage() {
        let list = BlockList::from_strings(&[
            "{d969a300-e7ff-11d0-a93b-00a0c90f2719}",
            "definitely not a guid",
            "",
        ]);
        assert_eq!(list.len(), 1);
        assert!(list.contains(&CLSID_NEW_MENU));
    }

    #[test]
    fn test_allowed_keeps_order() {
        let a = Clsid::from_u128(1);
        let b = Clsid::from_u128(2);
        let c = Clsid::from_u128(3);
        let list = BlockList::new([b]);

        assert_eq!(list.allowed(vec![c, b, a]), vec![c, a]);
        assert_eq!(BlockList::default().allowed(vec![a, b]), vec![a, b]);
    }
}
