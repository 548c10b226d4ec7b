//! Reading object headers in the target.
//!
//! The only header word the inspector interprets is the hub: the reference from an object to
//! the descriptor of its type. Hubs are objects too, so following hub words from any real
//! object quickly reaches the self-describing hub of hubs, which is its own hub. A location is
//! considered a plausible object origin if that walk reaches such a fixed point inside known
//! heap memory within a bounded number of hops.

use crate::util::conversions::is_address_aligned;
use crate::util::error::{Result, TeleError};
use crate::util::options::Options;
use crate::util::{Address, Word};
use crate::vm::RemoteMemory;

/// Header geometry shared by every object in the target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Origin-relative offset of the hub word.
    pub hub_offset: usize,
    /// Offset from an object's cell (its first byte) to its origin.
    pub origin_offset: usize,
    /// Low-bit tag marking a hub word as a forwarding pointer.
    pub forwarding_tag: usize,
    /// How many hub words the plausibility walk follows.
    pub max_hub_hops: usize,
}

impl HeaderLayout {
    pub fn new(options: &Options) -> Self {
        HeaderLayout {
            hub_offset: options.hub_offset,
            origin_offset: options.origin_offset,
            forwarding_tag: options.forwarding_tag,
            max_hub_hops: options.max_hub_hops,
        }
    }

    /// Location of the hub word of the object at `origin`.
    pub fn hub_address(&self, origin: Address) -> Result<Address> {
        origin
            .checked_add(self.hub_offset)
            .ok_or(TeleError::RemoteAccess(origin))
    }

    pub fn read_hub_word<M: RemoteMemory + ?Sized>(
        &self,
        memory: &M,
        origin: Address,
    ) -> Result<Word> {
        memory.read_word(self.hub_address(origin)?)
    }

    pub fn is_forwarding_word(&self, word: Word) -> bool {
        word & self.forwarding_tag == self.forwarding_tag
    }

    /// Decode a tagged forwarding word into the origin of the new copy.
    pub fn forwarded_origin(&self, word: Word) -> Option<Address> {
        if !self.is_forwarding_word(word) {
            return None;
        }
        let cell = Address::from_usize(word - self.forwarding_tag);
        if cell.is_zero() {
            return None;
        }
        cell.checked_add(self.origin_offset)
    }

    /// If the object at `origin` has been forwarded, the origin of its new copy. Unreadable
    /// memory counts as not forwarded.
    pub fn forwarding_address<M: RemoteMemory + ?Sized>(
        &self,
        memory: &M,
        origin: Address,
    ) -> Option<Address> {
        self.read_hub_word(memory, origin)
            .ok()
            .and_then(|word| self.forwarded_origin(word))
    }

    /// The hub of the object at `origin`, unless the hub word is a forwarding pointer.
    pub fn read_hub<M: RemoteMemory + ?Sized>(
        &self,
        memory: &M,
        origin: Address,
    ) -> Result<Option<Address>> {
        let word = self.read_hub_word(memory, origin)?;
        if self.is_forwarding_word(word) {
            Ok(None)
        } else {
            Ok(Some(Address::from_usize(word)))
        }
    }

    /// Does `origin` look like the origin of an object?
    ///
    /// `is_known` decides whether an address lies in memory the inspector knows about (heap
    /// regions or the boot image). Read failures count as "no".
    pub fn is_plausible_origin<M, F>(&self, memory: &M, origin: Address, is_known: F) -> bool
    where
        M: RemoteMemory + ?Sized,
        F: Fn(Address) -> bool,
    {
        if origin.is_zero() || !is_address_aligned(origin) {
            return false;
        }
        let mut current = origin;
        for _ in 0..self.max_hub_hops {
            let hub = match self.read_hub(memory, current) {
                Ok(Some(hub)) => hub,
                _ => return false,
            };
            if hub.is_zero() || !is_address_aligned(hub) || !is_known(hub) {
                return false;
            }
            if hub == current {
                return true;
            }
            current = hub;
        }
        false
    }
}
