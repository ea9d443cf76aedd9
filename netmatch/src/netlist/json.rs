//! Yosys JSON netlist encoding.
//!
//! Bits are encoded as net numbers (starting at 2) or as the constant strings
//! `"0"`, `"1"`, `"x"` and `"z"`. Nets named by several `netnames` entries
//! become direct connections between the corresponding wires.

use std::path::Path;
use std::{fs, io};

use derive_more::{Display, Error, From};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{
    Cell, Const, Design, Module, NetlistError, PortDirection, SigBit, SigMap, SigSpec, State,
};

/// Errors raised while reading or writing Yosys JSON netlists.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum NetlistJsonError {
    /// Could not read or write the file.
    #[display("IO error: {_0}")]
    Io(io::Error),
    /// Malformed JSON.
    #[display("Invalid JSON netlist: {_0}")]
    Json(serde_json::Error),
    /// A signal bit that is neither a net number nor a constant.
    #[display("Invalid signal bit {bit:?} in module {module}")]
    #[from(ignore)]
    InvalidBit {
        /// The offending value.
        bit: SmolStr,
        /// The module name.
        module: SmolStr,
    },
    /// A net used by a cell or port that is not declared in `netnames`.
    #[display("Net {net} of module {module} is not declared in netnames")]
    #[from(ignore)]
    UndeclaredNet {
        /// The net number.
        net: u64,
        /// The module name.
        module: SmolStr,
    },
    /// The decoded netlist is inconsistent.
    #[display("{_0}")]
    Netlist(NetlistError),
}

#[derive(Debug, Serialize, Deserialize)]
struct SerialDesign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creator: Option<String>,
    #[serde(default)]
    modules: IndexMap<SmolStr, SerialModule>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SerialModule {
    #[serde(default)]
    attributes: IndexMap<SmolStr, SerialValue>,
    #[serde(default)]
    ports: IndexMap<SmolStr, SerialPort>,
    #[serde(default)]
    cells: IndexMap<SmolStr, SerialCell>,
    #[serde(default)]
    netnames: IndexMap<SmolStr, SerialNet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerialPort {
    direction: PortDirection,
    bits: Vec<SerialBit>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerialCell {
    #[serde(default)]
    hide_name: u8,
    #[serde(rename = "type")]
    kind: SmolStr,
    #[serde(default)]
    parameters: IndexMap<SmolStr, SerialValue>,
    #[serde(default)]
    attributes: IndexMap<SmolStr, SerialValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    port_directions: IndexMap<SmolStr, PortDirection>,
    #[serde(default)]
    connections: IndexMap<SmolStr, Vec<SerialBit>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerialNet {
    #[serde(default)]
    hide_name: u8,
    bits: Vec<SerialBit>,
    #[serde(default)]
    attributes: IndexMap<SmolStr, SerialValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum SerialBit {
    Net(u64),
    Const(SmolStr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum SerialValue {
    Int(i64),
    Str(String),
}

fn is_binary(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| State::from_char(c).is_some())
}

impl From<SerialValue> for Const {
    fn from(value: SerialValue) -> Self {
        match value {
            SerialValue::Int(n) => Const::from_int(n, 32),
            SerialValue::Str(s) => match Const::from_binary_string(&s) {
                Some(c) if is_binary(&s) => c,
                // Text that looks like a binary number carries a trailing space.
                _ => match s.strip_suffix(' ') {
                    Some(t) if is_binary(t) || t.is_empty() => Const::from_text(t),
                    _ => Const::from_text(&s),
                },
            },
        }
    }
}

impl From<&Const> for SerialValue {
    fn from(value: &Const) -> Self {
        match value.as_text() {
            Some(t) if is_binary(&t) || t.is_empty() => SerialValue::Str(format!("{t} ")),
            Some(t) => SerialValue::Str(t),
            None => SerialValue::Str(value.to_binary_string()),
        }
    }
}

fn decode_values(values: IndexMap<SmolStr, SerialValue>) -> IndexMap<SmolStr, Const> {
    values.into_iter().map(|(k, v)| (k, v.into())).collect()
}

fn encode_values(values: &IndexMap<SmolStr, Const>) -> IndexMap<SmolStr, SerialValue> {
    values.iter().map(|(k, v)| (k.clone(), v.into())).collect()
}

struct ModuleDecoder {
    module: Module,
    nets: FxHashMap<u64, SigBit>,
}

impl ModuleDecoder {
    fn new(name: SmolStr) -> Self {
        Self {
            module: Module::new(name),
            nets: FxHashMap::default(),
        }
    }

    fn constant(&self, s: &SmolStr) -> Result<State, NetlistJsonError> {
        let mut chars = s.chars();
        match (chars.next().and_then(State::from_char), chars.next()) {
            (Some(state), None) => Ok(state),
            _ => Err(NetlistJsonError::InvalidBit {
                bit: s.clone(),
                module: self.module.name().clone(),
            }),
        }
    }

    /// Bind the bits of a freshly declared wire to their nets.
    fn declare(&mut self, sig: &SigSpec, bits: &[SerialBit]) -> Result<(), NetlistJsonError> {
        for (bit, serial) in sig.iter().zip(bits) {
            let driver = match serial {
                SerialBit::Net(n) => match self.nets.get(n) {
                    Some(&first) => first,
                    None => {
                        self.nets.insert(*n, bit);
                        continue;
                    }
                },
                SerialBit::Const(s) => SigBit::Const(self.constant(s)?),
            };
            self.module.connect(bit.into(), driver.into())?;
        }
        Ok(())
    }

    fn signal(&self, bits: &[SerialBit]) -> Result<SigSpec, NetlistJsonError> {
        bits.iter()
            .map(|serial| match serial {
                SerialBit::Net(n) => {
                    self.nets
                        .get(n)
                        .copied()
                        .ok_or_else(|| NetlistJsonError::UndeclaredNet {
                            net: *n,
                            module: self.module.name().clone(),
                        })
                }
                SerialBit::Const(s) => Ok(SigBit::Const(self.constant(s)?)),
            })
            .collect()
    }

    fn decode(mut self, serial: SerialModule) -> Result<Module, NetlistJsonError> {
        *self.module.attributes_mut() = decode_values(serial.attributes);

        for (name, net) in serial.netnames {
            let wire = self.module.add_wire(name, net.bits.len());
            self.module.wire_mut(wire).attributes = decode_values(net.attributes);
            self.declare(&SigSpec::from_wire(wire, net.bits.len()), &net.bits)?;
        }

        for (name, port) in serial.ports {
            let wire = match self.module.find_wire(&name) {
                Some(w) if self.module.wire(w).width == port.bits.len() => w,
                _ => {
                    let w = self.module.add_wire(name, port.bits.len());
                    self.declare(&SigSpec::from_wire(w, port.bits.len()), &port.bits)?;
                    w
                }
            };
            self.module.wire_mut(wire).port = Some(port.direction);
        }

        for (name, serial) in serial.cells {
            let mut cell = Cell::new(name.clone(), serial.kind);
            cell.params = decode_values(serial.parameters);
            cell.attributes = decode_values(serial.attributes);
            cell.directions = serial.port_directions;
            for (port, bits) in &serial.connections {
                cell.set_port(port.clone(), self.signal(bits)?);
            }
            let id = self.module.add_cell(name, cell.kind.clone());
            self.module[id] = cell;
        }

        Ok(self.module)
    }
}

#[derive(Default)]
struct ModuleEncoder {
    sigmap: SigMap,
    nets: FxHashMap<SigBit, u64>,
}

impl ModuleEncoder {
    fn bits(&mut self, sig: &SigSpec) -> Vec<SerialBit> {
        sig.iter()
            .map(|bit| match self.sigmap.bit(bit) {
                SigBit::Const(s) => SerialBit::Const(s.as_char().to_string().into()),
                canonical => {
                    let next = self.nets.len() as u64 + 2;
                    SerialBit::Net(*self.nets.entry(canonical).or_insert(next))
                }
            })
            .collect()
    }

    fn encode(mut self, module: &Module) -> SerialModule {
        self.sigmap = SigMap::new(module);
        let mut serial = SerialModule {
            attributes: encode_values(module.attributes()),
            ..Default::default()
        };

        for id in module.ports() {
            let wire = module.wire(id);
            let bits = self.bits(&SigSpec::from_wire(id, wire.width));
            if let Some(direction) = wire.port {
                serial
                    .ports
                    .insert(wire.name.clone(), SerialPort { direction, bits });
            }
        }

        for (_, cell) in module.cells() {
            let connections = cell
                .ports
                .iter()
                .map(|(port, sig)| (port.clone(), self.bits(sig)))
                .collect();
            serial.cells.insert(
                cell.name.clone(),
                SerialCell {
                    hide_name: u8::from(cell.name.starts_with('$')),
                    kind: cell.kind.clone(),
                    parameters: encode_values(&cell.params),
                    attributes: encode_values(&cell.attributes),
                    port_directions: cell.directions.clone(),
                    connections,
                },
            );
        }

        for (id, wire) in module.wires() {
            let bits = self.bits(&SigSpec::from_wire(id, wire.width));
            serial.netnames.insert(
                wire.name.clone(),
                SerialNet {
                    hide_name: u8::from(wire.name.starts_with('$')),
                    bits,
                    attributes: encode_values(&wire.attributes),
                },
            );
        }

        serial
    }
}

/// Load a design from a Yosys JSON file.
pub fn load_yosys_json_file(path: impl AsRef<Path>) -> Result<Design, NetlistJsonError> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    load_yosys_json_reader(reader)
}

/// Load a design from a Yosys JSON reader.
pub fn load_yosys_json_reader(json: impl io::Read) -> Result<Design, NetlistJsonError> {
    let serial: SerialDesign = serde_json::from_reader(json)?;
    let mut design = Design {
        creator: serial.creator,
        ..Default::default()
    };
    for (name, module) in serial.modules {
        design.add_module(ModuleDecoder::new(name).decode(module)?);
    }
    Ok(design)
}

/// Load a design from a Yosys JSON string.
pub fn load_yosys_json_str(json: &str) -> Result<Design, NetlistJsonError> {
    load_yosys_json_reader(json.as_bytes())
}

/// Save a design to a file in Yosys JSON format.
///
/// Directly connected wires share their net numbers.
pub fn save_yosys_json_file(design: &Design, path: impl AsRef<Path>) -> Result<(), NetlistJsonError> {
    let file = fs::File::create(path)?;
    let writer = io::BufWriter::new(file);
    save_yosys_json_writer(design, writer)
}

/// Save a design in Yosys JSON format to a writer.
pub fn save_yosys_json_writer(design: &Design, w: impl io::Write) -> Result<(), NetlistJsonError> {
    let serial = SerialDesign {
        creator: design.creator.clone(),
        modules: design
            .modules
            .iter()
            .map(|(name, module)| (name.clone(), ModuleEncoder::default().encode(module)))
            .collect(),
    };
    serde_json::to_writer_pretty(w, &serial)?;
    Ok(())
}

/// Save a design in Yosys JSON format to a String.
pub fn save_yosys_json_str(design: &Design) -> Result<String, NetlistJsonError> {
    let mut buf = Vec::new();
    save_yosys_json_writer(design, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    const ADDER: &str = r#"{
      "creator": "Yosys",
      "modules": {
        "top": {
          "attributes": { "top": "00000000000000000000000000000001", "src": "top.v:1.1-5.10" },
          "ports": {
            "a": { "direction": "input", "bits": [ 2, 3 ] },
            "y": { "direction": "output", "bits": [ 4, 5, 6 ] }
          },
          "cells": {
            "$add$top.v:3$1": {
              "hide_name": 1,
              "type": "$add",
              "parameters": { "A_SIGNED": 0, "A_WIDTH": "00000000000000000000000000000010", "B_WIDTH": 2, "Y_WIDTH": 3 },
              "attributes": {},
              "connections": { "A": [ 2, 3 ], "B": [ "1", "0" ], "Y": [ 4, 5, 6 ] }
            }
          },
          "netnames": {
            "a": { "hide_name": 0, "bits": [ 2, 3 ], "attributes": {} },
            "y": { "hide_name": 0, "bits": [ 4, 5, 6 ], "attributes": {} },
            "y_alias": { "hide_name": 0, "bits": [ 4, 5, "0" ], "attributes": { "keep": 1 } }
          }
        }
      }
    }"#;

    #[test]
    fn load_adder() {
        let design = load_yosys_json_str(ADDER).unwrap();
        assert_eq!(design.creator.as_deref(), Some("Yosys"));
        let module = design.module("top").unwrap();
        assert_eq!(module.attributes()["top"].as_int(), 1);
        assert_eq!(
            module.attributes()["src"].as_text().as_deref(),
            Some("top.v:1.1-5.10")
        );

        let a = module.find_wire("a").unwrap();
        let alias = module.find_wire("y_alias").unwrap();
        assert_eq!(module.wire(a).port, Some(PortDirection::Input));
        assert_eq!(module.wire(alias).port, None);
        assert!(module.wire(alias).bool_attribute("keep"));
        // Two alias bits and one constant bit.
        assert_eq!(module.connections().len(), 3);

        let add = module.find_cell("$add$top.v:3$1").unwrap();
        let cell = &module[add];
        assert_eq!(cell.kind, "$add");
        assert_eq!(cell.param("A_WIDTH").map(Const::as_int), Some(2));
        assert_eq!(cell.param("B_WIDTH").map(Const::as_int), Some(2));
        assert_eq!(cell.port("A"), Some(&SigSpec::from_wire(a, 2)));
        assert_eq!(
            cell.port("B").and_then(SigSpec::as_const),
            Some(Const::from_int(1, 2))
        );
    }

    #[test]
    fn round_trip_keeps_connectivity() {
        let design = load_yosys_json_str(ADDER).unwrap();
        let json = save_yosys_json_str(&design).unwrap();
        let reloaded = load_yosys_json_str(&json).unwrap();

        let before = design.module("top").unwrap();
        let after = reloaded.module("top").unwrap();
        assert_eq!(before.num_cells(), after.num_cells());
        assert_eq!(
            after.attributes()["src"].as_text().as_deref(),
            Some("top.v:1.1-5.10")
        );

        let sigmap = SigMap::new(after);
        let y = after.find_wire("y").unwrap();
        let alias = after.find_wire("y_alias").unwrap();
        assert_eq!(
            sigmap.bit(SigBit::wire(alias, 1)),
            sigmap.bit(SigBit::wire(y, 1))
        );
        assert_eq!(
            sigmap.bit(SigBit::wire(alias, 2)),
            SigBit::Const(State::S0)
        );
        let add = after.find_cell("$add$top.v:3$1").unwrap();
        assert_eq!(
            sigmap.apply(after[add].port("Y").unwrap()),
            sigmap.apply(&SigSpec::from_wire(y, 3))
        );
    }

    #[test]
    fn binary_looking_text_round_trips() {
        let text = Const::from_text("0101");
        let serial = SerialValue::from(&text);
        assert_eq!(serial, SerialValue::Str("0101 ".to_string()));
        assert_eq!(Const::from(serial), text);
    }

    #[test]
    fn undeclared_net() {
        let json = r#"{ "modules": { "m": { "cells": {
            "c": { "type": "$not", "connections": { "A": [ 7 ] } } } } } }"#;
        assert_matches!(
            load_yosys_json_str(json),
            Err(NetlistJsonError::UndeclaredNet { net: 7, .. })
        );
    }

    #[test]
    fn invalid_bit() {
        let json = r#"{ "modules": { "m": { "netnames": {
            "n": { "bits": [ "q" ] } } } } }"#;
        assert_matches!(
            load_yosys_json_str(json),
            Err(NetlistJsonError::InvalidBit { .. })
        );
    }
}
