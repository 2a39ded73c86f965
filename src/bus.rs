use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use puzzlehunt_core::ExtensionMsg;

use crate::console;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub i32);

/// Where a message came from or is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Background,
    /// Any extension page (gallery, puzzle view).
    Page,
    Tab(TabId),
}

/// Fire-and-forget messaging between extension contexts. Delivery is
/// at-most-once; a context that is not listening simply misses the message.
pub trait MessageBus {
    fn send_to_background(&self, msg: &ExtensionMsg);
    /// Every open tab except `except`.
    fn broadcast_to_tabs(&self, msg: &ExtensionMsg, except: Option<TabId>);
    fn notify_pages(&self, msg: &ExtensionMsg);
}

#[derive(Default)]
struct LocalBusInner {
    open_tabs: BTreeSet<TabId>,
    page_open: bool,
    inboxes: HashMap<Endpoint, VecDeque<(Endpoint, String)>>,
}

/// In-process router. Messages travel as JSON text like they do between real
/// contexts and wait in per-endpoint inboxes until the owner drains them.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Rc<RefCell<LocalBusInner>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tab(&self, tab: TabId) -> LocalPort {
        self.inner.borrow_mut().open_tabs.insert(tab);
        self.port(Endpoint::Tab(tab))
    }

    /// Closing drops anything still queued for the tab.
    pub fn close_tab(&self, tab: TabId) {
        let mut inner = self.inner.borrow_mut();
        inner.open_tabs.remove(&tab);
        inner.inboxes.remove(&Endpoint::Tab(tab));
    }

    pub fn open_page(&self) -> LocalPort {
        self.inner.borrow_mut().page_open = true;
        self.port(Endpoint::Page)
    }

    pub fn close_page(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.page_open = false;
        inner.inboxes.remove(&Endpoint::Page);
    }

    pub fn background(&self) -> LocalPort {
        self.port(Endpoint::Background)
    }

    pub fn open_tabs(&self) -> Vec<TabId> {
        self.inner.borrow().open_tabs.iter().copied().collect()
    }

    /// Takes every message waiting for `endpoint`, oldest first, with its
    /// sender. Anything that fails to parse is dropped.
    pub fn drain(&self, endpoint: Endpoint) -> Vec<(Endpoint, ExtensionMsg)> {
        let queued = self
            .inner
            .borrow_mut()
            .inboxes
            .remove(&endpoint)
            .unwrap_or_default();
        queued
            .into_iter()
            .filter_map(|(from, raw)| match ExtensionMsg::from_json(&raw) {
                Some(msg) => Some((from, msg)),
                None => {
                    console::warn(&format!("dropping malformed message: {raw}"));
                    None
                }
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.inner
            .borrow()
            .inboxes
            .values()
            .map(VecDeque::len)
            .sum()
    }

    fn port(&self, endpoint: Endpoint) -> LocalPort {
        LocalPort {
            endpoint,
            bus: self.clone(),
        }
    }

    fn deliver(&self, from: Endpoint, to: Endpoint, msg: &ExtensionMsg) {
        let Some(raw) = msg.to_json() else {
            console::warn("failed to encode message");
            return;
        };
        let mut inner = self.inner.borrow_mut();
        let reachable = match to {
            Endpoint::Background => true,
            Endpoint::Page => inner.page_open,
            Endpoint::Tab(tab) => inner.open_tabs.contains(&tab),
        };
        if reachable {
            inner.inboxes.entry(to).or_default().push_back((from, raw));
        }
    }
}

/// One context's handle on a [`LocalBus`].
#[derive(Clone)]
pub struct LocalPort {
    endpoint: Endpoint,
    bus: LocalBus,
}

impl LocalPort {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

impl MessageBus for LocalPort {
    fn send_to_background(&self, msg: &ExtensionMsg) {
        self.bus.deliver(self.endpoint, Endpoint::Background, msg);
    }

    fn broadcast_to_tabs(&self, msg: &ExtensionMsg, except: Option<TabId>) {
        for tab in self.bus.open_tabs() {
            if Some(tab) != except {
                self.bus.deliver(self.endpoint, Endpoint::Tab(tab), msg);
            }
        }
    }

    fn notify_pages(&self, msg: &ExtensionMsg) {
        self.bus.deliver(self.endpoint, Endpoint::Page, msg);
    }
}
