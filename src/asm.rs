//! Assembling the instruction stream into a ROM image.
//!
//! This module is used to convert the code generator's symbolic output
//! (`&[`[`Stmt`]`]`) into the byte image the VM boots from, and to write
//! that image out as an Intel HEX file.
//!
//! The assembler module notably consists of:
//! - [`assemble`]: the entry point, taking an instruction stream and a HEX
//!   file path
//! - [`Assembler`]: the struct performing the two assembler passes
//! - [`buffer::CodeBuffer`]: the byte buffer that co-resolves label
//!   positions and branch sizes
//! - [`encoding`]: the VM's encoding scheme (immediates, opcodes, branch
//!   forms)

pub mod buffer;
pub mod encoding;

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::ast::{Instr, LabelId, Stmt, Value};
use crate::hex;
use crate::prim::PrimTable;
use buffer::{CodeBuffer, LabelHandle};
use encoding::{CODE_START, MAGIC, MIN_RAM_ENCODING, MIN_ROM_ENCODING, PRIM_POP, PRIM_RETURN};

/// Error from assembling an instruction stream.
#[derive(Debug)]
pub enum AsmErr {
    /// The pool holds more constants than the header's count byte can name.
    TooManyConstants(usize),
    /// More global variables than the VM has slots for.
    TooManyGlobals(usize),
    /// Constant addresses ran into the RAM encoding region.
    ConstantsIntoRam(u16),
    /// `push-stack` reaching deeper than its one-byte form allows.
    StackTooDeep(u32),
    /// `call`/`jump` with more arguments than their one-byte form allows.
    TooManyArgs(u32),
    /// `prim` naming a primitive absent from the primitive table.
    UnknownPrim(String),
    /// A literal with no ROM representation.
    Unencodable(Value),
    /// A vector literal with no elements (the ROM record has no shape for it).
    EmptyVector,
    /// The same label identifier was defined twice.
    DuplicateLabel(LabelId),
    /// A branch targets a label that is never defined.
    UndefinedLabel(LabelId),
    /// The image outgrew the VM's 16-bit address space.
    ImageOverflow(usize),
    /// Writing the HEX file failed.
    Io(std::io::Error),
}

impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmErr::TooManyConstants(n) => write!(f, "too many constants ({n})"),
            AsmErr::TooManyGlobals(n)   => write!(f, "too many global variables ({n})"),
            AsmErr::ConstantsIntoRam(a) => write!(f, "constant address {a} falls in the RAM region"),
            AsmErr::StackTooDeep(n)     => write!(f, "stack is too deep (push-stack {n})"),
            AsmErr::TooManyArgs(n)      => write!(f, "too many arguments ({n})"),
            AsmErr::UnknownPrim(p)      => write!(f, "unknown primitive: {p}"),
            AsmErr::Unencodable(v)      => write!(f, "cannot encode object: {v}"),
            AsmErr::EmptyVector         => write!(f, "cannot encode an empty vector"),
            AsmErr::DuplicateLabel(l)   => write!(f, "label {l} defined twice"),
            AsmErr::UndefinedLabel(l)   => write!(f, "label {l} is never defined"),
            AsmErr::ImageOverflow(n)    => write!(f, "image of {n} bytes overflows the address space"),
            AsmErr::Io(e)               => write!(f, "could not write HEX file: {e}"),
        }
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            AsmErr::TooManyConstants(_) => Some("a ROM image can hold at most 256 pooled constants".into()),
            AsmErr::TooManyGlobals(_)   => Some("the VM has at most 256 global slots".into()),
            AsmErr::ConstantsIntoRam(_) => Some(format!("constant encodings must stay below {MIN_RAM_ENCODING}").into()),
            AsmErr::StackTooDeep(_)     => Some("push-stack can reach at most 31 entries down".into()),
            AsmErr::TooManyArgs(_)      => Some("call and jump encode at most 15 arguments".into()),
            AsmErr::UnknownPrim(_)      => Some("this name is not in the VM's primitive table".into()),
            AsmErr::Unencodable(_)      => None,
            AsmErr::EmptyVector         => Some("vector constants decompose into their element list, which needs at least one element".into()),
            AsmErr::DuplicateLabel(_)   => None,
            AsmErr::UndefinedLabel(_)   => None,
            AsmErr::ImageOverflow(_)    => Some("the image must fit in the VM's 16-bit address space".into()),
            AsmErr::Io(_)               => None,
        }
    }
}
impl From<std::io::Error> for AsmErr {
    fn from(err: std::io::Error) -> Self {
        AsmErr::Io(err)
    }
}

/// Bookkeeping entry for one pooled constant.
#[derive(Debug)]
struct ConstDesc {
    /// Buffer label bound to the constant's record, for back-patching.
    label: LabelHandle,
    /// References from code. References from inside other constants
    /// deliberately do not count.
    count: u32,
    /// Derived value the record points at: the element list of a string,
    /// vector or byte-vector, or the high part of a large integer.
    contents: Option<Value>,
    /// ROM encoding, assigned after the popularity sort.
    addr: u16,
}

/// The constant pool built in the first assembler pass.
///
/// Keyed by structural equality after character translation; iteration
/// order is insertion order until [`ConstPool::assign_addresses`] sorts it
/// into address order.
#[derive(Debug, Default)]
struct ConstPool {
    entries: IndexMap<Value, ConstDesc>,
}

impl ConstPool {
    /// Pools a literal, if it is not directly encodable.
    ///
    /// `from_code` marks references coming from a `push-constant`
    /// instruction; only those bump reference counts. Sub-components are
    /// pooled recursively with `from_code` off.
    fn add(&mut self, obj: &Value, from_code: bool, buf: &mut CodeBuffer) {
        let obj = encoding::translate(obj);
        if encoding::encode_direct(&obj).is_some() {
            return;
        }
        if let Some(desc) = self.entries.get_mut(&obj) {
            if from_code {
                desc.count += 1;
            }
            return;
        }

        let contents = match &obj {
            Value::Str(s) => Some(Value::list(s.chars().map(|c| Value::int(c as u32)))),
            Value::Vector(elems) => Some(Value::list(elems.iter().cloned())),
            Value::Bytes(bytes) => Some(Value::list(bytes.iter().map(|&b| Value::int(b)))),
            // Splitting off the high 16 bits terminates once the remainder
            // is a fixnum (0 or -1 for ordinary magnitudes).
            Value::Int(n) => Some(Value::Int(n >> 16usize)),
            _ => None,
        };

        self.entries.insert(obj.clone(), ConstDesc {
            label: buf.make_label(),
            count: u32::from(from_code),
            contents: contents.clone(),
            addr: 0,
        });

        match &obj {
            Value::Pair(car, cdr) => {
                self.add(car, false, buf);
                self.add(cdr, false, buf);
            }
            _ => {
                if let Some(contents) = &contents {
                    self.add(contents, false, buf);
                }
            }
        }
    }

    /// Sorts the pool most-referenced first and assigns ROM encodings.
    fn assign_addresses(&mut self) -> Result<(), AsmErr> {
        if self.entries.len() > 256 {
            return Err(AsmErr::TooManyConstants(self.entries.len()));
        }

        // Stable sort: equally popular constants keep insertion order,
        // which keeps assembly deterministic.
        self.entries.sort_by(|_, a, _, b| b.count.cmp(&a.count));

        let mut addr = MIN_ROM_ENCODING;
        for desc in self.entries.values_mut() {
            if addr >= MIN_RAM_ENCODING {
                return Err(AsmErr::ConstantsIntoRam(addr));
            }
            desc.addr = addr;
            addr += 1;
        }
        Ok(())
    }

    /// Encodes a literal as a machine word: its direct encoding if it has
    /// one, otherwise the ROM address assigned to its pool entry.
    fn encode(&self, obj: &Value) -> Result<u16, AsmErr> {
        let obj = encoding::translate(obj);
        if let Some(word) = encoding::encode_direct(&obj) {
            return Ok(word);
        }
        match self.entries.get(&obj) {
            Some(desc) => Ok(desc.addr),
            None => Err(AsmErr::Unencodable(obj)),
        }
    }

    /// Serialises one constant's 32-bit ROM record.
    fn record(&self, obj: &Value, desc: &ConstDesc) -> Result<u32, AsmErr> {
        let contents = desc.contents.as_ref();
        let (word0, word1): (u16, u16) = match obj {
            Value::Int(n) => {
                let hi = contents.unwrap_or_else(|| unreachable!("integers store their high part"));
                let low = (n & &BigInt::from(0xffff))
                    .to_u16()
                    .unwrap_or_else(|| unreachable!("masked to 16 bits"));
                (self.encode(hi)?, low)
            }
            Value::Pair(car, cdr) => (0x8000 | self.encode(car)?, self.encode(cdr)?),
            Value::Sym(_) => (0x8000, 0x2000),
            Value::Str(_) => {
                let chars = contents.unwrap_or_else(|| unreachable!("strings store their element list"));
                (0x8000 | self.encode(chars)?, 0x4000)
            }
            Value::Vector(_) => {
                // A vector's record is the pair record of its element list,
                // so the list must have a head to point at.
                match contents {
                    Some(Value::Pair(car, cdr)) => (0x8000 | self.encode(car)?, self.encode(cdr)?),
                    Some(Value::Nil) => return Err(AsmErr::EmptyVector),
                    _ => unreachable!("vectors store their element list"),
                }
            }
            Value::Bytes(bytes) => {
                let elems = contents.unwrap_or_else(|| unreachable!("byte-vectors store their element list"));
                // The length is stored raw, not fixnum-encoded.
                (0x8000 | bytes.len() as u16, 0x6000 | self.encode(elems)?)
            }
            other => return Err(AsmErr::Unencodable(other.clone())),
        };
        Ok(u32::from(word0) << 16 | u32::from(word1))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bookkeeping entry for one global variable.
#[derive(Debug)]
struct GlobalDesc {
    count: u32,
    slot: u16,
}

/// The global-variable table built in the first assembler pass.
#[derive(Debug, Default)]
struct GlobalTable {
    entries: IndexMap<String, GlobalDesc>,
}

impl GlobalTable {
    /// Interns a global, bumping its reference count if already present.
    fn add(&mut self, name: &str) {
        match self.entries.get_mut(name) {
            Some(desc) => desc.count += 1,
            None => {
                let slot = self.entries.len() as u16;
                self.entries.insert(name.to_string(), GlobalDesc { count: 1, slot });
            }
        }
    }

    /// Sorts most-referenced first and renumbers slots from 0, so the most
    /// popular globals get the short instruction forms.
    fn assign_slots(&mut self) -> Result<(), AsmErr> {
        if self.entries.len() > 256 {
            return Err(AsmErr::TooManyGlobals(self.entries.len()));
        }
        self.entries.sort_by(|_, a, _, b| b.count.cmp(&a.count));
        for (slot, desc) in self.entries.values_mut().enumerate() {
            desc.slot = slot as u16;
        }
        Ok(())
    }

    /// The slot of an interned global.
    fn slot(&self, name: &str) -> u16 {
        self.entries.get(name)
            .unwrap_or_else(|| unreachable!("globals are interned in the first pass"))
            .slot
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Per-run instruction counts, for the `--stats` report.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    counts: BTreeMap<&'static str, u32>,
}

impl Stats {
    fn record(&mut self, instr: &Instr) {
        *self.counts.entry(instr.name()).or_default() += 1;
    }

    /// Whether anything was counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Instruction tags and counts, most frequent first.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        let mut rows: Vec<_> = self.counts.iter().map(|(&name, &n)| (name, n)).collect();
        rows.sort_by_key(|&(_, n)| std::cmp::Reverse(n));
        rows.into_iter()
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, count) in self.iter() {
            writeln!(f, "{count:6}  {name}")?;
        }
        Ok(())
    }
}

/// The assembler! Converts the instruction stream into the ROM image.
#[derive(Debug, Default)]
pub struct Assembler {
    prims: PrimTable,
    stats: Stats,
}

impl Assembler {
    /// Creates an assembler using the stock VM's primitive table.
    pub fn new() -> Self {
        Assembler::default()
    }

    /// Creates an assembler with a custom primitive table.
    pub fn with_prims(prims: PrimTable) -> Self {
        Assembler { prims, stats: Stats::default() }
    }

    /// Instruction counts from the most recent assembly.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Assembles the instruction stream into the linear byte image.
    ///
    /// The image starts with the `fb d7` magic, the constant and global
    /// counts, and the serialised constant records, followed by the
    /// instruction bytes with all branches resolved.
    pub fn assemble_image(&mut self, code: &[Stmt]) -> Result<Vec<u8>, AsmErr> {
        self.stats = Stats::default();

        let mut buf = CodeBuffer::new(CODE_START);
        let mut consts = ConstPool::default();
        let mut globals = GlobalTable::default();
        let mut labels: HashMap<LabelId, LabelHandle> = HashMap::new();

        // Pass 1: register labels, pool constants, intern globals.
        for stmt in code {
            match stmt {
                Stmt::Label(id) => match labels.entry(*id) {
                    Entry::Occupied(_) => return Err(AsmErr::DuplicateLabel(*id)),
                    Entry::Vacant(e) => {
                        e.insert(buf.make_label());
                    }
                },
                Stmt::Instr(Instr::PushConstant(obj)) => consts.add(obj, true, &mut buf),
                Stmt::Instr(Instr::PushGlobal(name) | Instr::SetGlobal(name)) => globals.add(name),
                Stmt::Instr(_) => {}
            }
        }

        consts.assign_addresses()?;
        globals.assign_slots()?;

        // Header, then the constant records in address order, each with its
        // label bound at the record so code can name it.
        buf.emit_u8(MAGIC[0]);
        buf.emit_u8(MAGIC[1]);
        buf.emit_u8(consts.len() as u8);
        buf.emit_u8(globals.len() as u8);
        for i in 0..consts.len() {
            let (obj, desc) = consts.entries.get_index(i)
                .unwrap_or_else(|| unreachable!("index within pool"));
            let record = consts.record(obj, desc)?;
            let label = desc.label;
            buf.place_label(label);
            buf.emit_u32(record);
        }

        // Pass 2: bind label positions and emit every instruction.
        for stmt in code {
            match stmt {
                Stmt::Label(id) => buf.place_label(labels[id]),
                Stmt::Instr(instr) => {
                    self.stats.record(instr);
                    self.emit(instr, &mut buf, &consts, &globals, &labels)?;
                }
            }
        }

        buf.assemble()?;
        Ok(buf.into_bytes())
    }

    /// Assembles the instruction stream and writes the Intel HEX file.
    pub fn assemble_to_hex(&mut self, code: &[Stmt], hex_path: &Path) -> Result<PathBuf, AsmErr> {
        let image = self.assemble_image(code)?;
        Ok(hex::write_hex(&image, CODE_START, hex_path)?)
    }

    fn emit(
        &self,
        instr: &Instr,
        buf: &mut CodeBuffer,
        consts: &ConstPool,
        globals: &GlobalTable,
        labels: &HashMap<LabelId, LabelHandle>,
    ) -> Result<(), AsmErr> {
        let target = |id: &LabelId| {
            labels.get(id).copied().ok_or(AsmErr::UndefinedLabel(*id))
        };

        match instr {
            Instr::Entry { nparams, rest } => {
                buf.emit_u8(match *rest {
                    false => *nparams,
                    true  => nparams.wrapping_neg(),
                });
            }
            Instr::PushConstant(obj) => {
                let word = consts.encode(obj)?;
                match word <= 31 {
                    true  => buf.emit_u8(word as u8),
                    false => buf.emit_u16(0xa000 | word),
                }
            }
            Instr::PushStack(n) => match *n <= 31 {
                true  => buf.emit_u8(0x20 | *n as u8),
                false => return Err(AsmErr::StackTooDeep(*n)),
            },
            Instr::PushGlobal(name) => {
                let slot = globals.slot(name);
                match slot <= 15 {
                    true  => buf.emit_u8(0x40 | slot as u8),
                    false => {
                        buf.emit_u8(0x8e);
                        buf.emit_u8(slot as u8);
                    }
                }
            }
            Instr::SetGlobal(name) => {
                let slot = globals.slot(name);
                match slot <= 15 {
                    true  => buf.emit_u8(0x50 | slot as u8),
                    false => {
                        buf.emit_u8(0x8f);
                        buf.emit_u8(slot as u8);
                    }
                }
            }
            Instr::Call(n) => match *n <= 15 {
                true  => buf.emit_u8(0x60 | *n as u8),
                false => return Err(AsmErr::TooManyArgs(*n)),
            },
            Instr::Jump(n) => match *n <= 15 {
                true  => buf.emit_u8(0x70 | *n as u8),
                false => return Err(AsmErr::TooManyArgs(*n)),
            },
            Instr::CallToplevel(id) => buf.branch(encoding::CALL_TOPLEVEL, target(id)?),
            Instr::JumpToplevel(id) => buf.branch(encoding::JUMP_TOPLEVEL, target(id)?),
            Instr::Goto(id)         => buf.branch(encoding::GOTO, target(id)?),
            Instr::GotoIfFalse(id)  => buf.branch(encoding::GOTO_IF_FALSE, target(id)?),
            Instr::Closure(id)      => buf.branch(encoding::CLOSURE, target(id)?),
            Instr::Prim(name) => {
                let index = self.prims.get(name)
                    .ok_or_else(|| AsmErr::UnknownPrim(name.clone()))?;
                buf.emit_u8(0xc0 | index);
            }
            Instr::Return => buf.emit_u8(0xc0 | PRIM_RETURN),
            Instr::Pop    => buf.emit_u8(0xc0 | PRIM_POP),
        }

        Ok(())
    }
}

/// Assembles an instruction stream and writes it as an Intel HEX file,
/// returning the written path.
///
/// This is a shortcut over building an [`Assembler`], using the stock
/// primitive table.
pub fn assemble(code: &[Stmt], hex_path: impl AsRef<Path>) -> Result<PathBuf, AsmErr> {
    Assembler::new().assemble_to_hex(code, hex_path.as_ref())
}

/// Like [`assemble`], but also hands back the instruction counts.
pub fn assemble_with_stats(
    code: &[Stmt],
    hex_path: impl AsRef<Path>,
) -> Result<(PathBuf, Stats), AsmErr> {
    let mut asm = Assembler::new();
    let path = asm.assemble_to_hex(code, hex_path.as_ref())?;
    Ok((path, asm.stats.clone()))
}
