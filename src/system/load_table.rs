// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Run-time resolution of named entry points from named native libraries.
//!
//! The set of exported subscription functions varies by platform version,
//! so nothing here is linked statically. Optional entries are expected to
//! be absent on any given version, only the table-wide minimum matters.

use std::collections::HashMap;
use thiserror::Error;

/// A resolved symbol address. Stored as an integer so tables can move
/// between threads, cast back at the call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSymbol(usize);

impl RawSymbol {
    pub fn new(addr: usize) -> Self {
        RawSymbol(addr)
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

pub trait LoadedLibrary {
    fn symbol(&self, name: &str) -> Option<RawSymbol>;
}

pub trait LibraryLoader {
    fn open(&self, library: &str) -> Option<Box<dyn LoadedLibrary + Send + Sync>>;
}

/// Loads through the dynamic linker.
pub struct NativeLoader;

struct NativeLibrary(libloading::Library);

impl LoadedLibrary for NativeLibrary {
    fn symbol(&self, name: &str) -> Option<RawSymbol> {
        let sym = unsafe { self.0.get::<*const ()>(name.as_bytes()) }.ok()?;
        Some(RawSymbol(*sym as usize))
    }
}

impl LibraryLoader for NativeLoader {
    fn open(&self, library: &str) -> Option<Box<dyn LoadedLibrary + Send + Sync>> {
        match unsafe { libloading::Library::new(library) } {
            Ok(lib) => Some(Box::new(NativeLibrary(lib))),
            Err(error) => {
                tracing::debug!(library = library, error = %error, "library not loadable");
                None
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("required entry point '{symbol}' in '{library}' could not be resolved")]
    Required {
        library: &'static str,
        symbol: &'static str,
    },
    #[error("resolved {resolved} of {total} entry points, need at least {needed}")]
    TooFew {
        resolved: usize,
        total: usize,
        needed: usize,
    },
}

pub struct FuncEntry {
    pub required: bool,
    pub library: &'static str,
    pub symbol: &'static str,
    resolved: Option<RawSymbol>,
}

impl FuncEntry {
    pub fn required(library: &'static str, symbol: &'static str) -> Self {
        FuncEntry {
            required: true,
            library,
            symbol,
            resolved: None,
        }
    }

    pub fn optional(library: &'static str, symbol: &'static str) -> Self {
        FuncEntry {
            required: false,
            library,
            symbol,
            resolved: None,
        }
    }
}

pub struct LoadTable<L> {
    loader: L,
    entries: Vec<FuncEntry>,
    libraries: HashMap<&'static str, Option<Box<dyn LoadedLibrary + Send + Sync>>>,
    min_needed: usize,
}

impl<L> LoadTable<L>
where
    L: LibraryLoader,
{
    pub fn new(loader: L, entries: Vec<FuncEntry>, min_needed: usize) -> Self {
        LoadTable {
            loader,
            entries,
            libraries: HashMap::new(),
            min_needed,
        }
    }

    /// Resolve every entry that is not resolved yet. Idempotent, a second
    /// call is a no-op for entries that already succeeded. Every entry is
    /// attempted even after a required one fails, to maximize diagnostics.
    /// Returns the total number of resolved entries.
    pub fn resolve(&mut self) -> usize {
        let loader = &self.loader;
        let libraries = &mut self.libraries;

        for entry in &mut self.entries {
            if entry.resolved.is_some() {
                continue;
            }
            let name = entry.library;
            let library = libraries.entry(name).or_insert_with(|| loader.open(name));
            match library {
                Some(library) => {
                    entry.resolved = library.symbol(entry.symbol);
                    if entry.resolved.is_none() {
                        tracing::debug!(
                            library = entry.library,
                            symbol = entry.symbol,
                            "entry point absent",
                        );
                    }
                },
                None => {
                    tracing::debug!(
                        library = entry.library,
                        symbol = entry.symbol,
                        "library absent",
                    );
                },
            }
        }
        self.resolved_count()
    }

    /// Clear all pointers and release the library handles.
    pub fn unresolve(&mut self) {
        for entry in &mut self.entries {
            entry.resolved = None;
        }
        self.libraries.clear();
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.resolved.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, symbol: &str) -> Option<RawSymbol> {
        self.entries
            .iter()
            .find(|e| e.symbol == symbol)
            .and_then(|e| e.resolved)
    }

    pub fn has(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    /// Resolve and apply the failure policy: a missing required entry or
    /// a total below the declared minimum fails the table as a whole.
    pub fn ensure_loaded(&mut self) -> Result<usize, ResolveError> {
        let resolved = self.resolve();
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.required && e.resolved.is_none())
        {
            return Err(ResolveError::Required {
                library: entry.library,
                symbol: entry.symbol,
            });
        }
        if resolved < self.min_needed {
            return Err(ResolveError::TooFew {
                resolved,
                total: self.entries.len(),
                needed: self.min_needed,
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use super::{FuncEntry, LibraryLoader, LoadTable, LoadedLibrary, RawSymbol, ResolveError};

    struct FakeLibrary {
        symbols: Vec<(&'static str, usize)>,
    }

    impl LoadedLibrary for FakeLibrary {
        fn symbol(&self, name: &str) -> Option<RawSymbol> {
            self.symbols
                .iter()
                .find(|(s, _)| *s == name)
                .map(|&(_, addr)| RawSymbol::new(addr))
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        libraries: HashMap<&'static str, Vec<(&'static str, usize)>>,
        opens: Rc<Cell<usize>>,
    }

    impl LibraryLoader for FakeLoader {
        fn open(&self, library: &str) -> Option<Box<dyn LoadedLibrary + Send + Sync>> {
            self.opens.set(self.opens.get() + 1);
            let symbols = self.libraries.get(library)?.clone();
            Some(Box::new(FakeLibrary { symbols }))
        }
    }

    fn loader() -> FakeLoader {
        let mut libraries = HashMap::new();
        libraries.insert(
            "fwpuclnt.dll",
            vec![("FwpmEngineOpen0", 0x1000), ("FwpmNetEventSubscribe1", 0x2000)],
        );
        FakeLoader {
            libraries,
            opens: Rc::new(Cell::new(0)),
        }
    }

    fn table(loader: FakeLoader, min_needed: usize) -> LoadTable<FakeLoader> {
        LoadTable::new(
            loader,
            vec![
                FuncEntry::required("fwpuclnt.dll", "FwpmEngineOpen0"),
                FuncEntry::optional("fwpuclnt.dll", "FwpmNetEventSubscribe0"),
                FuncEntry::optional("fwpuclnt.dll", "FwpmNetEventSubscribe1"),
                FuncEntry::optional("absent.dll", "Whatever"),
            ],
            min_needed,
        )
    }

    #[test]
    fn resolve_is_idempotent() {
        let loader = loader();
        let opens = loader.opens.clone();
        let mut table = table(loader, 2);
        assert_eq!(table.resolve(), 2);
        assert_eq!(table.resolve(), 2);
        // both libraries opened once, even the absent one
        assert_eq!(opens.get(), 2);
        assert_eq!(
            table.get("FwpmEngineOpen0"),
            Some(RawSymbol::new(0x1000)),
        );
        assert!(!table.has("FwpmNetEventSubscribe0"));
    }

    #[test]
    fn unresolve_clears_everything() {
        let mut table = table(loader(), 2);
        table.resolve();
        table.unresolve();
        assert_eq!(table.resolved_count(), 0);
        assert!(table.get("FwpmEngineOpen0").is_none());
        // and resolution works again afterwards
        assert_eq!(table.resolve(), 2);
    }

    #[test]
    fn missing_required_entry_fails_the_table() {
        let mut table = LoadTable::new(
            loader(),
            vec![FuncEntry::required("fwpuclnt.dll", "NoSuchExport")],
            0,
        );
        match table.ensure_loaded() {
            Err(ResolveError::Required { symbol, .. }) => assert_eq!(symbol, "NoSuchExport"),
            other => panic!("expected required-entry failure, got {:?}", other),
        }
    }

    #[test]
    fn too_few_resolved_fails_the_table() {
        let mut table = table(loader(), 3);
        match table.ensure_loaded() {
            Err(ResolveError::TooFew { resolved, needed, .. }) => {
                assert_eq!(resolved, 2);
                assert_eq!(needed, 3);
            },
            other => panic!("expected too-few failure, got {:?}", other),
        }
    }

    #[test]
    fn enough_resolved_passes() {
        let mut table = table(loader(), 2);
        assert_eq!(table.ensure_loaded().unwrap(), 2);
    }
}
