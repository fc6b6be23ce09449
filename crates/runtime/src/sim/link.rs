//! Side-channel links
//!
//! Packets are queued by `put_packet` and evaluated by `process`. The only
//! evaluation understood is `EvaluatePacket[Set[symbol, value]]`, which binds
//! `symbol` in the link's own symbol table.

use super::{handle, id_of, world};
use crate::library::LinkFunctions;
use hostlink_core::abi::MLink;
use hostlink_core::Expr;
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_int;

const FAILED: c_int = 1;

#[derive(Debug, Default)]
pub(super) struct Link {
    pending: Vec<Vec<u8>>,
    processed: Vec<Expr>,
    symbols: HashMap<String, Expr>,
    broken: bool,
}

impl Link {
    fn evaluate(&mut self, packet: &Expr) {
        if !packet.has_head("EvaluatePacket") {
            return;
        }
        let [body] = packet.args() else {
            return;
        };
        if let (true, [Expr::Symbol(name), value]) = (body.has_head("Set"), body.args()) {
            self.symbols.insert(name.clone(), value.clone());
        }
    }
}

thread_local! {
    static MAIN_LINK: Cell<usize> = const { Cell::new(0) };
}

unsafe extern "C" fn main_link() -> MLink {
    handle(MAIN_LINK.with(Cell::get))
}

unsafe extern "C" fn put_packet(link: MLink, data: *const u8, len: usize) -> c_int {
    if data.is_null() && len > 0 {
        return FAILED;
    }
    let bytes = if len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
    };
    let mut w = world();
    match w.links.get_mut(&id_of(link)) {
        Some(l) if !l.broken => {
            l.pending.push(bytes);
            0
        }
        _ => FAILED,
    }
}

unsafe extern "C" fn process(link: MLink) -> c_int {
    let mut w = world();
    let Some(l) = w.links.get_mut(&id_of(link)) else {
        return FAILED;
    };
    if l.broken {
        return FAILED;
    }
    for bytes in std::mem::take(&mut l.pending) {
        match Expr::from_bytes(&bytes) {
            Ok(packet) => {
                l.evaluate(&packet);
                l.processed.push(packet);
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable packet");
                return FAILED;
            }
        }
    }
    0
}

pub(super) const LINK: LinkFunctions = LinkFunctions {
    main_link,
    put_packet,
    process,
};

/// Open a new link
pub fn new_link() -> MLink {
    let mut w = world();
    let id = w.allocate_id();
    w.links.insert(id, Link::default());
    handle(id)
}

/// Make `link` the main link of this thread (null detaches)
pub fn set_main_link(link: MLink) {
    MAIN_LINK.with(|m| m.set(id_of(link)));
}

/// Make every later packet operation on `link` fail
pub fn break_link(link: MLink) {
    if let Some(l) = world().links.get_mut(&id_of(link)) {
        l.broken = true;
    }
}

/// Drain the packets `link` has processed so far
pub fn take_packets(link: MLink) -> Vec<Expr> {
    world()
        .links
        .get_mut(&id_of(link))
        .map(|l| std::mem::take(&mut l.processed))
        .unwrap_or_default()
}

/// Value bound to `symbol` by packets processed on `link`
pub fn symbol_value(link: MLink, symbol: &str) -> Option<Expr> {
    world()
        .links
        .get(&id_of(link))
        .and_then(|l| l.symbols.get(symbol).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(link: MLink, expr: &Expr) -> c_int {
        let bytes = expr.to_bytes().unwrap();
        unsafe { put_packet(link, bytes.as_ptr(), bytes.len()) }
    }

    #[test]
    fn test_set_binds_symbol_after_process() {
        let link = new_link();
        let packet = Expr::evaluate_packet(Expr::set("x", Expr::Integer(3)));
        assert_eq!(send(link, &packet), 0);
        assert_eq!(symbol_value(link, "x"), None);
        assert_eq!(unsafe { process(link) }, 0);
        assert_eq!(symbol_value(link, "x"), Some(Expr::Integer(3)));
        assert_eq!(take_packets(link), vec![packet]);
        assert!(take_packets(link).is_empty());
    }

    #[test]
    fn test_broken_link_fails() {
        let link = new_link();
        break_link(link);
        assert_ne!(send(link, &Expr::Integer(1)), 0);
        assert_ne!(unsafe { process(link) }, 0);
    }

    #[test]
    fn test_main_link_is_per_thread() {
        let link = new_link();
        set_main_link(link);
        assert_eq!(unsafe { main_link() }, link);
        let other = std::thread::spawn(|| unsafe { main_link() }.is_null())
            .join()
            .unwrap();
        assert!(other);
        set_main_link(std::ptr::null_mut());
        assert!(unsafe { main_link() }.is_null());
    }

    #[test]
    fn test_garbage_packet_fails_process() {
        let link = new_link();
        assert_eq!(unsafe { put_packet(link, [0xff].as_ptr(), 1) }, 0);
        assert_ne!(unsafe { process(link) }, 0);
    }
}
