//! The assembler's byte buffer.
//!
//! [`CodeBuffer`] accumulates the ROM image: literal bytes, label
//! placements, and label-bearing instructions whose size is not yet known.
//! Label positions and instruction sizes depend on each other, so the
//! buffer resolves them together: every deferred instruction starts in its
//! widest form and [`CodeBuffer::assemble`] repeatedly re-lays the buffer,
//! letting instructions shrink to the smallest form applicable at the
//! current label positions, until a full pass changes nothing. Forms only
//! ever shrink, so the iteration terminates.

use super::encoding::{BranchOps, Form};
use super::AsmErr;

/// A handle to a label within a [`CodeBuffer`].
///
/// Created with [`CodeBuffer::make_label`] and pinned to a position with
/// [`CodeBuffer::place_label`]; the position becomes queryable once the
/// buffer has been assembled.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct LabelHandle(usize);

/// One span of the buffer.
#[derive(Debug)]
enum Item {
    /// Bytes whose encoding is already final.
    Bytes(Vec<u8>),
    /// The label is pinned to this position.
    Label(LabelHandle),
    /// A label-bearing instruction awaiting the sizing fixed point.
    Branch(Branch),
}

#[derive(Debug)]
struct Branch {
    ops: BranchOps,
    target: LabelHandle,
    form: Form,
}

/// A byte buffer with deferred-size instructions, loaded at a fixed origin.
///
/// All multi-byte emissions are big-endian, which is the only byte order
/// the VM reads.
#[derive(Debug)]
pub struct CodeBuffer {
    origin: u32,
    items: Vec<Item>,
    /// Whether each label has been placed yet.
    placed: Vec<bool>,
    /// Label positions, filled in by [`CodeBuffer::assemble`].
    resolved: Vec<Option<u32>>,
}

impl CodeBuffer {
    /// Creates an empty buffer whose first byte will land at `origin`.
    pub fn new(origin: u16) -> Self {
        CodeBuffer {
            origin: u32::from(origin),
            items: vec![],
            placed: vec![],
            resolved: vec![],
        }
    }

    fn bytes(&mut self) -> &mut Vec<u8> {
        // Coalesce runs of fixed bytes into a single item.
        if !matches!(self.items.last(), Some(Item::Bytes(_))) {
            self.items.push(Item::Bytes(vec![]));
        }
        let Some(Item::Bytes(bytes)) = self.items.last_mut() else {
            unreachable!("just pushed a byte item");
        };
        bytes
    }

    /// Appends one byte.
    pub fn emit_u8(&mut self, b: u8) {
        self.bytes().push(b);
    }

    /// Appends a 16-bit word, big-endian.
    pub fn emit_u16(&mut self, w: u16) {
        self.bytes().extend(w.to_be_bytes());
    }

    /// Appends a 32-bit word, big-endian.
    pub fn emit_u32(&mut self, w: u32) {
        self.bytes().extend(w.to_be_bytes());
    }

    /// Creates a fresh, unplaced label.
    pub fn make_label(&mut self) -> LabelHandle {
        let handle = LabelHandle(self.placed.len());
        self.placed.push(false);
        self.resolved.push(None);
        handle
    }

    /// Pins a label to the current position.
    ///
    /// # Panics
    ///
    /// Panics if the label has already been placed.
    pub fn place_label(&mut self, label: LabelHandle) {
        assert!(!self.placed[label.0], "label placed twice");
        self.placed[label.0] = true;
        self.items.push(Item::Label(label));
    }

    /// Appends a label-bearing instruction targeting `label`.
    ///
    /// The instruction occupies its widest form until [`CodeBuffer::assemble`]
    /// shrinks it.
    pub fn branch(&mut self, ops: BranchOps, label: LabelHandle) {
        self.items.push(Item::Branch(Branch { ops, target: label, form: Form::Abs16 }));
    }

    /// The position of a placed label.
    ///
    /// Only defined once [`CodeBuffer::assemble`] has run.
    pub fn label_pos(&self, label: LabelHandle) -> Option<u16> {
        self.resolved[label.0].map(|pos| pos as u16)
    }

    /// Walks the buffer under the current branch forms, producing the start
    /// position of every item, the position of every placed label, and the
    /// end position of the buffer.
    fn layout(&self) -> (Vec<u32>, Vec<Option<u32>>, u32) {
        let mut item_pos = Vec::with_capacity(self.items.len());
        let mut label_pos = vec![None; self.placed.len()];
        let mut pos = self.origin;

        for item in &self.items {
            item_pos.push(pos);
            match item {
                Item::Bytes(bytes) => pos += bytes.len() as u32,
                Item::Label(label) => label_pos[label.0] = Some(pos),
                Item::Branch(branch) => pos += branch.form.size(),
            }
        }

        (item_pos, label_pos, pos)
    }

    /// Runs the sizing fixed point and freezes label positions.
    pub fn assemble(&mut self) -> Result<(), AsmErr> {
        loop {
            let (item_pos, label_pos, _) = self.layout();
            let mut changed = false;

            for (i, item) in self.items.iter_mut().enumerate() {
                let Item::Branch(branch) = item else { continue };
                let target = label_pos[branch.target.0]
                    .unwrap_or_else(|| unreachable!("branch target placed before assembly"));

                // Shrink-only keeps the iteration monotone; a form never
                // widens once a smaller one has been applicable.
                let form = branch.ops.pick(item_pos[i], target);
                if form.size() < branch.form.size() {
                    branch.form = form;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        let (_, label_pos, end) = self.layout();
        if end > 0x1_0000 {
            return Err(AsmErr::ImageOverflow((end - self.origin) as usize));
        }
        self.resolved = label_pos;
        Ok(())
    }

    /// Emits the finished byte image.
    ///
    /// Must be called after [`CodeBuffer::assemble`].
    pub fn into_bytes(self) -> Vec<u8> {
        let (item_pos, label_pos, end) = self.layout();
        let mut out = Vec::with_capacity((end - self.origin) as usize);

        for (i, item) in self.items.iter().enumerate() {
            match item {
                Item::Bytes(bytes) => out.extend_from_slice(bytes),
                Item::Label(_) => {}
                Item::Branch(branch) => {
                    let target = label_pos[branch.target.0]
                        .unwrap_or_else(|| unreachable!("branch target placed before assembly"));
                    branch.ops.encode_into(&mut out, branch.form, item_pos[i], target, self.origin);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod test {
    use super::super::encoding::{self, GOTO, GOTO_IF_FALSE};
    use super::CodeBuffer;

    #[test]
    fn emits_big_endian() {
        let mut buf = CodeBuffer::new(0);
        buf.emit_u8(0x01);
        buf.emit_u16(0x0203);
        buf.emit_u32(0x04050607);
        buf.assemble().unwrap();
        assert_eq!(buf.into_bytes(), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn forward_branch_shrinks_to_rel4() {
        // goto-if-false over 10 filler bytes: embeddable once shrunk.
        let mut buf = CodeBuffer::new(0x8000);
        let label = buf.make_label();
        buf.branch(GOTO_IF_FALSE, label);
        for _ in 0..10 {
            buf.emit_u8(0x00);
        }
        buf.place_label(label);
        buf.assemble().unwrap();

        assert_eq!(buf.label_pos(label), Some(0x800b));
        let bytes = buf.into_bytes();
        // offset from the byte after the opcode: 0x800b - 0x8001 = 10
        assert_eq!(bytes[0], 0x90 + 10);
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn shrinking_converges_across_dependent_branches() {
        // Two gotos whose distances each depend on the other's size.
        let mut buf = CodeBuffer::new(0x8000);
        let a = buf.make_label();
        let b = buf.make_label();
        buf.branch(GOTO, b);
        buf.place_label(a);
        for _ in 0..100 {
            buf.emit_u8(0x00);
        }
        buf.branch(GOTO, a);
        buf.place_label(b);
        buf.assemble().unwrap();

        let bytes = buf.into_bytes();
        assert_eq!(bytes.len(), 104);
        // First goto: self = 0x8000, target = 0x8068 -> 128 + 0x68 - 2
        assert_eq!(&bytes[0..2], &[0xb7, 128 + 0x66]);
        // Second goto: self = 0x8066, target = 0x8002 -> 128 - 0x66
        assert_eq!(&bytes[102..104], &[0xb7, 128 - 0x66]);
    }

    #[test]
    fn far_branch_stays_absolute() {
        let mut buf = CodeBuffer::new(encoding::CODE_START);
        let label = buf.make_label();
        buf.branch(GOTO, label);
        for _ in 0..300 {
            buf.emit_u8(0xcc);
        }
        buf.place_label(label);
        buf.assemble().unwrap();

        let bytes = buf.into_bytes();
        assert_eq!(&bytes[0..3], &[0xb2, 0x01, 0x2f]);
    }

    #[test]
    fn image_overflow_is_fatal() {
        let mut buf = CodeBuffer::new(0x8000);
        for _ in 0..0x8001 {
            buf.emit_u8(0);
        }
        assert!(matches!(buf.assemble(), Err(super::AsmErr::ImageOverflow(_))));
    }
}
