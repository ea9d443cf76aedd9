//! Gate-level netlists.
//!
//! A [`Module`] is an arena of [`Wire`]s and [`Cell`]s. Cells connect to
//! wires through named ports carrying [`SigSpec`]s, and are configured by
//! named [`Const`] parameters. Cell identifiers stay valid when other cells
//! are added or removed, so matchers can hold on to them while the module is
//! being rewritten.

pub mod json;
mod sig;
pub mod sigmap;

pub use sig::{Const, SigBit, SigChunk, SigSpec, State};
pub use sigmap::{SigMap, SigUsers};

use std::ops::{Index, IndexMut};

use derive_more::{Display, Error};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use smol_str::{format_smolstr, SmolStr};

/// Identifier of a wire inside a [`Module`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("w{_0}")]
pub struct WireId(u32);

impl WireId {
    /// Create a wire identifier from its index.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The index of the wire in its module.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a cell inside a [`Module`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("c{_0}")]
pub struct CellId(u32);

impl CellId {
    /// Create a cell identifier from its index.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The index of the cell in its module.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Direction of a module or cell port.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Driven from outside.
    #[display("input")]
    Input,
    /// Driven from inside.
    #[display("output")]
    Output,
    /// Bidirectional.
    #[display("inout")]
    Inout,
}

/// A named bundle of signal bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    /// The wire name.
    pub name: SmolStr,
    /// Number of bits.
    pub width: usize,
    /// Direction, when the wire is a module port.
    pub port: Option<PortDirection>,
    /// Wire attributes, such as `keep` or `init`.
    pub attributes: IndexMap<SmolStr, Const>,
}

impl Wire {
    /// The value of an attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&Const> {
        self.attributes.get(name)
    }

    /// Whether a boolean attribute is present and set.
    pub fn bool_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(Const::as_bool)
    }
}

/// A primitive instance in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// The instance name.
    pub name: SmolStr,
    /// The cell type, e.g. `$mul`.
    pub kind: SmolStr,
    /// Port connections.
    pub ports: IndexMap<SmolStr, SigSpec>,
    /// Parameter values.
    pub params: IndexMap<SmolStr, Const>,
    /// Cell attributes.
    pub attributes: IndexMap<SmolStr, Const>,
    /// Known port directions.
    pub directions: IndexMap<SmolStr, PortDirection>,
}

impl Cell {
    /// Create a cell with no connections.
    pub fn new(name: impl Into<SmolStr>, kind: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ports: IndexMap::new(),
            params: IndexMap::new(),
            attributes: IndexMap::new(),
            directions: IndexMap::new(),
        }
    }

    /// Whether the cell type is one of `kinds`.
    pub fn is_kind(&self, kinds: &[&str]) -> bool {
        kinds.contains(&self.kind.as_str())
    }

    /// The signal connected to a port.
    pub fn port(&self, name: &str) -> Option<&SigSpec> {
        self.ports.get(name)
    }

    /// Whether the port is connected.
    pub fn has_port(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// Connect a port, replacing any previous connection.
    pub fn set_port(&mut self, name: impl Into<SmolStr>, sig: impl Into<SigSpec>) {
        self.ports.insert(name.into(), sig.into());
    }

    /// The value of a parameter.
    pub fn param(&self, name: &str) -> Option<&Const> {
        self.params.get(name)
    }

    /// Set a parameter value.
    pub fn set_param(&mut self, name: impl Into<SmolStr>, value: impl Into<Const>) {
        self.params.insert(name.into(), value.into());
    }
}

/// Errors raised by netlist mutations.
#[derive(Debug, Display, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum NetlistError {
    /// The cell does not exist, or has been removed.
    #[display("Cell {cell} is not part of module {module}")]
    UnknownCell {
        /// The missing cell.
        cell: CellId,
        /// The module name.
        module: SmolStr,
    },
    /// Two signals of different widths cannot be connected.
    #[display("Cannot connect a {lhs}-bit signal to a {rhs}-bit signal")]
    WidthMismatch {
        /// Width of the first signal.
        lhs: usize,
        /// Width of the second signal.
        rhs: usize,
    },
    /// The name is already used by another cell.
    #[display("Duplicate cell name {name} in module {module}")]
    DuplicateName {
        /// The name.
        name: SmolStr,
        /// The module name.
        module: SmolStr,
    },
}

/// A set of modules, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Design {
    /// The tool that produced the design, if known.
    pub creator: Option<String>,
    /// The modules, by name.
    pub modules: IndexMap<SmolStr, Module>,
}

impl Design {
    /// Add a module, replacing any module with the same name.
    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.name().clone(), module);
    }

    /// A module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// A mutable module by name.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }
}

/// A netlist module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    name: SmolStr,
    wires: Vec<Wire>,
    cells: Vec<Option<Cell>>,
    cell_names: FxHashMap<SmolStr, CellId>,
    wire_names: FxHashMap<SmolStr, WireId>,
    connections: Vec<(SigSpec, SigSpec)>,
    attributes: IndexMap<SmolStr, Const>,
    next_auto_id: usize,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The module name.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Module attributes.
    pub fn attributes(&self) -> &IndexMap<SmolStr, Const> {
        &self.attributes
    }

    /// Mutable module attributes.
    pub fn attributes_mut(&mut self) -> &mut IndexMap<SmolStr, Const> {
        &mut self.attributes
    }

    /// Add an internal wire.
    ///
    /// Wire names are not required to be unique. [`Module::find_wire`] returns
    /// the first wire added under a name.
    pub fn add_wire(&mut self, name: impl Into<SmolStr>, width: usize) -> WireId {
        let id = WireId::new(self.wires.len());
        let name = name.into();
        self.wire_names.entry(name.clone()).or_insert(id);
        self.wires.push(Wire {
            name,
            width,
            port: None,
            attributes: IndexMap::new(),
        });
        id
    }

    /// Add a wire with an automatically generated name.
    pub fn add_fresh_wire(&mut self, width: usize) -> WireId {
        let name = self.fresh_name();
        self.add_wire(name, width)
    }

    /// Add a module port.
    pub fn add_port(
        &mut self,
        name: impl Into<SmolStr>,
        width: usize,
        direction: PortDirection,
    ) -> WireId {
        let id = self.add_wire(name, width);
        self.wires[id.index()].port = Some(direction);
        id
    }

    /// A wire of the module.
    ///
    /// # Panics
    ///
    /// If the identifier does not belong to this module.
    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.index()]
    }

    /// A mutable wire of the module.
    ///
    /// Renaming the wire through this reference is not reflected by
    /// [`Module::find_wire`].
    ///
    /// # Panics
    ///
    /// If the identifier does not belong to this module.
    pub fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        &mut self.wires[id.index()]
    }

    /// All the wires of the module.
    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> + '_ {
        self.wires
            .iter()
            .enumerate()
            .map(|(i, w)| (WireId::new(i), w))
    }

    /// Find a wire by name.
    pub fn find_wire(&self, name: &str) -> Option<WireId> {
        self.wire_names.get(name).copied()
    }

    /// The wires that are module ports.
    pub fn ports(&self) -> impl Iterator<Item = WireId> + '_ {
        self.wires()
            .filter(|(_, w)| w.port.is_some())
            .map(|(id, _)| id)
    }

    /// Add a cell with no connections.
    ///
    /// If the name is already taken, a fresh name is used instead.
    pub fn add_cell(&mut self, name: impl Into<SmolStr>, kind: impl Into<SmolStr>) -> CellId {
        let mut name = name.into();
        if self.cell_names.contains_key(&name) {
            name = self.fresh_name();
        }
        let id = CellId::new(self.cells.len());
        self.cell_names.insert(name.clone(), id);
        self.cells.push(Some(Cell::new(name, kind)));
        id
    }

    /// A cell of the module, if it has not been removed.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index()).and_then(Option::as_ref)
    }

    /// A mutable cell of the module, if it has not been removed.
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Iterate over the live cells, in creation order.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| Some((CellId::new(i), c.as_ref()?)))
    }

    /// The identifiers of the live cells, in creation order.
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells().map(|(id, _)| id).collect()
    }

    /// Number of live cells.
    pub fn num_cells(&self) -> usize {
        self.cell_names.len()
    }

    /// Find a cell by name.
    pub fn find_cell(&self, name: &str) -> Option<CellId> {
        self.cell_names.get(name).copied()
    }

    /// Remove a cell. Its identifier is never reused.
    pub fn remove_cell(&mut self, id: CellId) -> Result<Cell, NetlistError> {
        let cell = self
            .cells
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or_else(|| self.unknown_cell(id))?;
        self.cell_names.remove(&cell.name);
        Ok(cell)
    }

    /// Rename a cell.
    pub fn rename_cell(&mut self, id: CellId, name: impl Into<SmolStr>) -> Result<(), NetlistError> {
        let name = name.into();
        if let Some(&other) = self.cell_names.get(&name) {
            if other == id {
                return Ok(());
            }
            return Err(NetlistError::DuplicateName {
                name,
                module: self.name.clone(),
            });
        }
        let unknown = self.unknown_cell(id);
        let cell = self.cell_mut(id).ok_or(unknown)?;
        let old = std::mem::replace(&mut cell.name, name.clone());
        self.cell_names.remove(&old);
        self.cell_names.insert(name, id);
        Ok(())
    }

    /// Exchange the names of two cells, so that references by name follow
    /// the replacement.
    pub fn swap_names(&mut self, a: CellId, b: CellId) -> Result<(), NetlistError> {
        let name_a = self.cell(a).ok_or_else(|| self.unknown_cell(a))?.name.clone();
        let name_b = self.cell(b).ok_or_else(|| self.unknown_cell(b))?.name.clone();
        self[a].name = name_b.clone();
        self[b].name = name_a.clone();
        self.cell_names.insert(name_a, b);
        self.cell_names.insert(name_b, a);
        Ok(())
    }

    /// Add a cell of type `kind` that takes over the name of `id`. The old
    /// cell is renamed to a fresh name and keeps its connections.
    ///
    /// On error nothing is added.
    pub fn replace_cell(&mut self, id: CellId, kind: impl Into<SmolStr>) -> Result<CellId, NetlistError> {
        let name = self.cell(id).ok_or_else(|| self.unknown_cell(id))?.name.clone();
        let fresh = self.fresh_name();
        self.rename_cell(id, fresh)?;
        Ok(self.add_cell(name, kind))
    }

    /// Connect two signals directly.
    pub fn connect(&mut self, lhs: SigSpec, rhs: SigSpec) -> Result<(), NetlistError> {
        if lhs.len() != rhs.len() {
            return Err(NetlistError::WidthMismatch {
                lhs: lhs.len(),
                rhs: rhs.len(),
            });
        }
        self.connections.push((lhs, rhs));
        Ok(())
    }

    /// Direct connections between signals.
    pub fn connections(&self) -> &[(SigSpec, SigSpec)] {
        &self.connections
    }

    /// A new name that is not used by any cell or wire of the module.
    pub fn fresh_name(&mut self) -> SmolStr {
        loop {
            self.next_auto_id += 1;
            let name = format_smolstr!("$auto${}", self.next_auto_id);
            if !self.cell_names.contains_key(&name) && !self.wire_names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Render a signal using wire names, MSB first.
    pub fn describe(&self, sig: &SigSpec) -> String {
        let parts: Vec<String> = sig
            .chunks()
            .into_iter()
            .rev()
            .map(|chunk| match chunk {
                SigChunk::Const(states) => {
                    let bits: String = states.iter().rev().map(|s| s.as_char()).collect();
                    format!("{}'{bits}", states.len())
                }
                SigChunk::Wire {
                    wire,
                    offset,
                    width,
                } => {
                    let w = self.wire(wire);
                    if offset == 0 && width == w.width {
                        w.name.to_string()
                    } else if width == 1 {
                        format!("{}[{offset}]", w.name)
                    } else {
                        format!("{}[{}:{offset}]", w.name, offset + width - 1)
                    }
                }
            })
            .collect();
        match parts.len() {
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => format!("{{ {} }}", parts.join(" ")),
        }
    }

    fn unknown_cell(&self, cell: CellId) -> NetlistError {
        NetlistError::UnknownCell {
            cell,
            module: self.name.clone(),
        }
    }
}

impl Index<CellId> for Module {
    type Output = Cell;

    fn index(&self, id: CellId) -> &Cell {
        self.cell(id)
            .unwrap_or_else(|| panic!("{id} is not a live cell of module {}", self.name))
    }
}

impl IndexMut<CellId> for Module {
    fn index_mut(&mut self, id: CellId) -> &mut Cell {
        let name = self.name.clone();
        self.cell_mut(id)
            .unwrap_or_else(|| panic!("{id} is not a live cell of module {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    #[test]
    fn add_and_remove_cells() {
        let mut module = Module::new("top");
        let a = module.add_cell("a", "$and");
        let b = module.add_cell("b", "$or");
        assert_eq!(module.num_cells(), 2);

        module.remove_cell(a).unwrap();
        assert_eq!(module.cell_ids(), vec![b]);
        assert_eq!(module.find_cell("a"), None);
        assert_matches!(
            module.remove_cell(a),
            Err(NetlistError::UnknownCell { cell, .. }) => assert_eq!(cell, a)
        );

        // Identifiers are never reused.
        let c = module.add_cell("a", "$xor");
        assert_ne!(c, a);
    }

    #[test]
    fn duplicate_names_get_fresh_ones() {
        let mut module = Module::new("top");
        let a = module.add_cell("x", "$and");
        let b = module.add_cell("x", "$and");
        assert_eq!(module[a].name, "x");
        assert_ne!(module[b].name, "x");
        assert_eq!(module.find_cell(&module[b].name.clone()), Some(b));
    }

    #[test]
    fn swap_cell_names() {
        let mut module = Module::new("top");
        let old = module.add_cell("mult", "$mul");
        let new = module.add_cell("$auto$1", "QL_DSP");
        module.swap_names(new, old).unwrap();

        assert_eq!(module.find_cell("mult"), Some(new));
        assert_eq!(module[old].name, "$auto$1");
    }

    #[test]
    fn replacement_takes_the_name() {
        let mut module = Module::new("top");
        let y = SigSpec::from_wire(module.add_wire("y", 2), 2);
        let old = module.add_cell("mult", "$mul");
        module[old].set_port("Y", y);
        let new = module.replace_cell(old, "QL_DSP").unwrap();

        assert_eq!(module.find_cell("mult"), Some(new));
        assert_eq!(module[new].kind, "QL_DSP");
        assert!(module[new].ports.is_empty());
        assert!(module[old].name.starts_with("$auto$"));
        assert!(module[old].has_port("Y"));
    }

    #[test]
    fn replacing_a_removed_cell_adds_nothing() {
        let mut module = Module::new("top");
        let old = module.add_cell("mult", "$mul");
        module.add_cell("other", "$add");
        module.remove_cell(old).unwrap();

        assert_matches!(
            module.replace_cell(old, "QL_DSP"),
            Err(NetlistError::UnknownCell { cell, .. }) => assert_eq!(cell, old)
        );
        assert_eq!(module.num_cells(), 1);
        assert_eq!(module.find_cell("mult"), None);
    }

    #[test]
    fn wire_lookup_by_name() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 1);
        let port = module.add_port("p", 4, PortDirection::Input);
        module.add_wire("a", 2);
        assert_eq!(module.find_wire("a"), Some(a));
        assert_eq!(module.find_wire("p"), Some(port));
        assert_eq!(module.find_wire("b"), None);
    }

    #[test]
    fn fresh_names_avoid_wires() {
        let mut module = Module::new("top");
        module.add_wire("$auto$1", 1);
        module.add_cell("$auto$2", "$and");
        let fresh = module.add_fresh_wire(3);
        assert_eq!(module.wire(fresh).name, "$auto$3");
        assert_eq!(module.find_wire("$auto$3"), Some(fresh));
        assert_eq!(module.fresh_name(), "$auto$4");
    }

    #[test]
    fn connect_checks_widths() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 2);
        let b = module.add_wire("b", 3);
        assert_matches!(
            module.connect(SigSpec::from_wire(a, 2), SigSpec::from_wire(b, 3)),
            Err(NetlistError::WidthMismatch { lhs: 2, rhs: 3 })
        );
    }

    #[test]
    fn describe_signals() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 4);
        let mut sig = SigSpec::from_wire(a, 4).extract(1, 2);
        sig.push(State::S1.into());
        assert_eq!(module.describe(&sig), "{ 1'1 a[2:1] }");
        assert_eq!(module.describe(&SigSpec::from_wire(a, 4)), "a");
    }
}
