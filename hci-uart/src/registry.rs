//! Protocol registry.
//!
//! A fixed-size table mapping small integer ids to protocol
//! implementations. Construct one `Registry` at system start and hand an
//! `Arc` of it to every session; drop it (or call `clear`) at teardown.
//!
//! Registration changes are rare and lookups happen on every bind, so the
//! table sits behind a read-mostly `RwLock`.

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::{MAX_PROTO, VERSION};

type Slots = [Option<Arc<dyn Protocol>>; MAX_PROTO];

/// Process-lifetime protocol table.
pub struct Registry {
    slots: RwLock<Slots>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        info!("HCI UART driver ver {}", VERSION);
        Self {
            slots: RwLock::new(core::array::from_fn(|_| None)),
        }
    }

    fn slot(id: u32) -> Result<usize> {
        let index = id as usize;
        if index >= MAX_PROTO {
            return Err(Error::InvalidId);
        }
        Ok(index)
    }

    /// Registers a protocol under `id`.
    pub fn register(&self, id: u32, protocol: Arc<dyn Protocol>) -> Result<()> {
        let index = Self::slot(id)?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots[index].is_some() {
            return Err(Error::AlreadyRegistered);
        }
        info!("registered protocol {} as id {}", protocol.name(), id);
        slots[index] = Some(protocol);
        Ok(())
    }

    /// Removes the protocol registered under `id`.
    ///
    /// Sessions already bound to it keep their instance until they close.
    pub fn unregister(&self, id: u32) -> Result<()> {
        let index = Self::slot(id)?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots[index].take() {
            Some(protocol) => {
                info!("unregistered protocol {} (id {})", protocol.name(), id);
                Ok(())
            }
            None => Err(Error::NotRegistered),
        }
    }

    /// Returns the protocol registered under `id`.
    pub fn lookup(&self, id: u32) -> Result<Arc<dyn Protocol>> {
        let index = Self::slot(id).map_err(|_| Error::NotFound)?;
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots[index].clone().ok_or(Error::NotFound)
    }

    /// Returns the ids currently registered, ascending.
    pub fn registered(&self) -> Vec<u32> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as u32)
            .collect()
    }

    /// Removes every protocol.
    pub fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.iter_mut() {
            *slot = None;
        }
        debug!("protocol registry cleared");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolInstance;
    use crate::session::Session;

    struct Named(&'static str);

    impl Protocol for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn open(&self, _session: &Session) -> Result<Box<dyn ProtocolInstance>> {
            Err(Error::Protocol("not openable"))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        registry.register(5, Arc::new(Named("a"))).unwrap();

        assert_eq!(registry.lookup(5).unwrap().name(), "a");
        assert_eq!(registry.registered(), vec![5]);
    }

    #[test]
    fn test_duplicate_register_keeps_first() {
        let registry = Registry::new();
        registry.register(5, Arc::new(Named("a"))).unwrap();

        let result = registry.register(5, Arc::new(Named("b")));
        assert_eq!(result.err(), Some(Error::AlreadyRegistered));
        assert_eq!(registry.lookup(5).unwrap().name(), "a");
    }

    #[test]
    fn test_invalid_ids() {
        let registry = Registry::new();
        let result = registry.register(MAX_PROTO as u32, Arc::new(Named("a")));
        assert_eq!(result.err(), Some(Error::InvalidId));
        assert_eq!(registry.unregister(99).err(), Some(Error::InvalidId));
        assert_eq!(registry.lookup(99).err(), Some(Error::NotFound));
    }

    #[test]
    fn test_unregister() {
        let registry = Registry::new();
        assert_eq!(registry.unregister(1).err(), Some(Error::NotRegistered));

        registry.register(1, Arc::new(Named("a"))).unwrap();
        registry.unregister(1).unwrap();
        assert_eq!(registry.lookup(1).err(), Some(Error::NotFound));

        // the slot is free again
        registry.register(1, Arc::new(Named("b"))).unwrap();
        assert_eq!(registry.lookup(1).unwrap().name(), "b");
    }

    #[test]
    fn test_clear() {
        let registry = Registry::new();
        registry.register(0, Arc::new(Named("a"))).unwrap();
        registry.register(7, Arc::new(Named("b"))).unwrap();
        registry.clear();
        assert!(registry.registered().is_empty());
    }
}
