//! Wire protocol codec (§4.1, §6).
//!
//! Every frame on the wire is a fixed 40-byte header followed by a
//! variable-length payload:
//!
//! ```text
//! offset  size  field
//!      0     4  magic            0x54_58_4c_01, big-endian bytes
//!      4     1  version          protocol version, currently 1
//!      5     1  msg_type         `MessageType` discriminant
//!      6     1  flags            bit 0 = `FLAG_CHECKSUM`
//!      7     1  reserved         always 0, reserved for future flags
//!      8    16  session_id       big-endian u128, `SessionId::ZERO` if n/a
//!     24     8  sequence         little-endian u64
//!     32     4  payload_len      little-endian u32
//!     36     4  crc32            little-endian u32, CRC-32 of the payload
//! ```
//!
//! `crc32` is only meaningful when `FLAG_CHECKSUM` is set in `flags`; the
//! four bytes are always present so the header stays a fixed size. When the
//! checksum flag is set, the field is verified on decode and a mismatch is
//! fatal to the connection per §7.

use crate::error::CodecError;
use crate::ids::{PaneId, SessionId, Sequence};
use crate::model::{BufferDelta, CellSpan, RowDelta, Split, StyleEntry, TreeNodeCapture};

/// Size in bytes of the fixed frame header.
pub const HEADER_LEN: usize = 40;

/// Magic number identifying a deskmux frame, as it appears on the wire.
pub const MAGIC: [u8; 4] = [0x54, 0x58, 0x4c, 0x01];

/// The only protocol version this build speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Set when `crc32` in the header is a real checksum over the payload.
pub const FLAG_CHECKSUM: u8 = 1 << 0;

/// Sentinel tree-node byte used in place of a present node, marking "no
/// node here" (an absent root, or a split with a missing child).
const NIL_NODE: u8 = 0xFF;

/// Discriminant byte for each message type (§6 "message inventory").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Welcome = 2,
    ConnectRequest = 3,
    ConnectAccept = 4,
    ResumeRequest = 5,
    KeyEvent = 6,
    MouseEvent = 7,
    Resize = 8,
    Paste = 9,
    ClipboardSet = 10,
    ClipboardGet = 11,
    ClipboardData = 12,
    ThemeUpdate = 13,
    ThemeAck = 14,
    Ping = 15,
    Pong = 16,
    TreeSnapshot = 17,
    BufferDelta = 18,
    BufferAck = 19,
    PaneFocus = 20,
    PaneState = 21,
    StateUpdate = 22,
}

impl MessageType {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Hello,
            2 => Self::Welcome,
            3 => Self::ConnectRequest,
            4 => Self::ConnectAccept,
            5 => Self::ResumeRequest,
            6 => Self::KeyEvent,
            7 => Self::MouseEvent,
            8 => Self::Resize,
            9 => Self::Paste,
            10 => Self::ClipboardSet,
            11 => Self::ClipboardGet,
            12 => Self::ClipboardData,
            13 => Self::ThemeUpdate,
            14 => Self::ThemeAck,
            15 => Self::Ping,
            16 => Self::Pong,
            17 => Self::TreeSnapshot,
            18 => Self::BufferDelta,
            19 => Self::BufferAck,
            20 => Self::PaneFocus,
            21 => Self::PaneState,
            22 => Self::StateUpdate,
            _ => return None,
        })
    }
}

/// The decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub msg_type: MessageType,
    pub flags: u8,
    pub session_id: SessionId,
    pub sequence: Sequence,
    pub payload_len: u32,
    pub crc32: u32,
}

impl FrameHeader {
    #[must_use]
    pub const fn has_checksum(&self) -> bool {
        self.flags & FLAG_CHECKSUM != 0
    }
}

/// A decoded message, paired with the session/sequence carried in its
/// header by `decode_frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello { client_name: String },
    Welcome { server_name: String },
    ConnectRequest { session_id: SessionId },
    ConnectAccept { session_id: SessionId, resume_supported: bool },
    ResumeRequest { session_id: SessionId, last_sequence: Sequence },
    KeyEvent { key_code: u32, rune_value: i32, modifiers: u16 },
    MouseEvent { x: i32, y: i32, button_mask: u32, modifiers: u16 },
    Resize { cols: i32, rows: i32 },
    Paste { data: String },
    ClipboardSet { data: String },
    ClipboardGet,
    ClipboardData { data: String },
    ThemeUpdate { theme_json: String },
    ThemeAck { theme_json: String },
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
    TreeSnapshot { panes: Vec<PaneSnapshotWire>, root: Option<TreeNodeCapture> },
    BufferDelta(BufferDelta),
    BufferAck { acked_sequence: Sequence },
    PaneFocus { pane_id: PaneId },
    PaneState { pane_id: PaneId, flags: u8, z_order: i32 },
    StateUpdate {
        active_workspace_id: i32,
        all_workspaces: Vec<i32>,
        in_control_mode: bool,
        sub_mode: String,
        active_title: String,
        desktop_bg_rgb: u32,
    },
}

impl Message {
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Hello { .. } => MessageType::Hello,
            Self::Welcome { .. } => MessageType::Welcome,
            Self::ConnectRequest { .. } => MessageType::ConnectRequest,
            Self::ConnectAccept { .. } => MessageType::ConnectAccept,
            Self::ResumeRequest { .. } => MessageType::ResumeRequest,
            Self::KeyEvent { .. } => MessageType::KeyEvent,
            Self::MouseEvent { .. } => MessageType::MouseEvent,
            Self::Resize { .. } => MessageType::Resize,
            Self::Paste { .. } => MessageType::Paste,
            Self::ClipboardSet { .. } => MessageType::ClipboardSet,
            Self::ClipboardGet => MessageType::ClipboardGet,
            Self::ClipboardData { .. } => MessageType::ClipboardData,
            Self::ThemeUpdate { .. } => MessageType::ThemeUpdate,
            Self::ThemeAck { .. } => MessageType::ThemeAck,
            Self::Ping { .. } => MessageType::Ping,
            Self::Pong { .. } => MessageType::Pong,
            Self::TreeSnapshot { .. } => MessageType::TreeSnapshot,
            Self::BufferDelta(_) => MessageType::BufferDelta,
            Self::BufferAck { .. } => MessageType::BufferAck,
            Self::PaneFocus { .. } => MessageType::PaneFocus,
            Self::PaneState { .. } => MessageType::PaneState,
            Self::StateUpdate { .. } => MessageType::StateUpdate,
        }
    }
}

/// The wire form of a captured pane (§3 "PaneSnapshotWire"): everything a
/// fresh client needs to render a pane from scratch, without any style
/// interning (a `TreeSnapshot` always carries full content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneSnapshotWire {
    pub pane_id: PaneId,
    pub title: String,
    pub rows: Vec<String>,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub app_type: String,
    pub app_config: String,
}

/// Encode `message` into a complete frame (header + payload), writing a
/// CRC-32 checksum when `with_checksum` is set.
#[must_use]
pub fn encode_frame(
    session_id: SessionId,
    sequence: Sequence,
    message: &Message,
    with_checksum: bool,
) -> Vec<u8> {
    let payload = encode_payload(message);
    let mut flags = 0u8;
    let crc = if with_checksum {
        flags |= FLAG_CHECKSUM;
        crc32fast::hash(&payload)
    } else {
        0
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.push(PROTOCOL_VERSION);
    frame.push(message.message_type() as u8);
    frame.push(flags);
    frame.push(0); // reserved
    frame.extend_from_slice(&session_id.to_be_bytes());
    frame.extend_from_slice(&u64::from(sequence).to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Decode the fixed 40-byte header from the front of `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = bytes[4];
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let msg_type = MessageType::from_u8(bytes[5]).ok_or(CodecError::UnknownMessageType(bytes[5]))?;
    let flags = bytes[6];
    if flags & !FLAG_CHECKSUM != 0 {
        return Err(CodecError::UnknownRequiredFlag(flags & !FLAG_CHECKSUM));
    }
    let session_id = SessionId::from_be_bytes(bytes[8..24].try_into().unwrap());
    let sequence = Sequence::new(u64::from_le_bytes(bytes[24..32].try_into().unwrap()));
    let payload_len = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
    let crc32 = u32::from_le_bytes(bytes[36..40].try_into().unwrap());
    Ok(FrameHeader {
        version,
        msg_type,
        flags,
        session_id,
        sequence,
        payload_len,
        crc32,
    })
}

/// Decode a complete frame from `bytes`, which must contain at least
/// `HEADER_LEN + header.payload_len` bytes (check `decode_header` first if
/// you need to know how much to read off a stream).
pub fn decode_frame(bytes: &[u8]) -> Result<(FrameHeader, Message), CodecError> {
    let header = decode_header(bytes)?;
    let payload_start = HEADER_LEN;
    let payload_end = payload_start + header.payload_len as usize;
    if bytes.len() < payload_end {
        return Err(CodecError::Truncated {
            expected: payload_end,
            actual: bytes.len(),
        });
    }
    let payload = &bytes[payload_start..payload_end];

    if header.has_checksum() {
        let computed = crc32fast::hash(payload);
        if computed != header.crc32 {
            return Err(CodecError::ChecksumMismatch {
                header_crc: header.crc32,
                computed_crc: computed,
            });
        }
    }

    let message = decode_payload(header.msg_type, payload)?;
    Ok((header, message))
}

fn encode_payload(message: &Message) -> Vec<u8> {
    let mut w = Writer::new();
    match message {
        Message::Hello { client_name } => w.string(client_name),
        Message::Welcome { server_name } => w.string(server_name),
        Message::ConnectRequest { session_id } => w.session_id(*session_id),
        Message::ConnectAccept { session_id, resume_supported } => {
            w.session_id(*session_id);
            w.bool(*resume_supported);
        }
        Message::ResumeRequest { session_id, last_sequence } => {
            w.session_id(*session_id);
            w.u64(u64::from(*last_sequence));
        }
        Message::KeyEvent { key_code, rune_value, modifiers } => {
            w.u32(*key_code);
            w.i32(*rune_value);
            w.u16(*modifiers);
        }
        Message::MouseEvent { x, y, button_mask, modifiers } => {
            w.i32(*x);
            w.i32(*y);
            w.u32(*button_mask);
            w.u16(*modifiers);
        }
        Message::Resize { cols, rows } => {
            w.i32(*cols);
            w.i32(*rows);
        }
        Message::Paste { data }
        | Message::ClipboardSet { data }
        | Message::ClipboardData { data } => w.string(data),
        Message::ClipboardGet => {}
        Message::ThemeUpdate { theme_json } | Message::ThemeAck { theme_json } => {
            w.string(theme_json);
        }
        Message::Ping { timestamp } | Message::Pong { timestamp } => w.u64(*timestamp),
        Message::TreeSnapshot { panes, root } => {
            w.u32(panes.len() as u32);
            for pane in panes {
                w.pane_snapshot(pane);
            }
            w.tree_node(root.as_ref());
        }
        Message::BufferDelta(delta) => w.buffer_delta(delta),
        Message::BufferAck { acked_sequence } => w.u64(u64::from(*acked_sequence)),
        Message::PaneFocus { pane_id } => w.pane_id(*pane_id),
        Message::PaneState { pane_id, flags, z_order } => {
            w.pane_id(*pane_id);
            w.u8(*flags);
            w.i32(*z_order);
        }
        Message::StateUpdate {
            active_workspace_id,
            all_workspaces,
            in_control_mode,
            sub_mode,
            active_title,
            desktop_bg_rgb,
        } => {
            w.i32(*active_workspace_id);
            w.u32(all_workspaces.len() as u32);
            for id in all_workspaces {
                w.i32(*id);
            }
            w.bool(*in_control_mode);
            w.string(sub_mode);
            w.string(active_title);
            w.u32(*desktop_bg_rgb);
        }
    }
    w.into_bytes()
}

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Message, CodecError> {
    let mut r = Reader::new(payload);
    let message = match msg_type {
        MessageType::Hello => Message::Hello { client_name: r.string()? },
        MessageType::Welcome => Message::Welcome { server_name: r.string()? },
        MessageType::ConnectRequest => Message::ConnectRequest { session_id: r.session_id()? },
        MessageType::ConnectAccept => Message::ConnectAccept {
            session_id: r.session_id()?,
            resume_supported: r.bool()?,
        },
        MessageType::ResumeRequest => Message::ResumeRequest {
            session_id: r.session_id()?,
            last_sequence: Sequence::new(r.u64()?),
        },
        MessageType::KeyEvent => Message::KeyEvent {
            key_code: r.u32()?,
            rune_value: r.i32()?,
            modifiers: r.u16()?,
        },
        MessageType::MouseEvent => Message::MouseEvent {
            x: r.i32()?,
            y: r.i32()?,
            button_mask: r.u32()?,
            modifiers: r.u16()?,
        },
        MessageType::Resize => Message::Resize { cols: r.i32()?, rows: r.i32()? },
        MessageType::Paste => Message::Paste { data: r.string()? },
        MessageType::ClipboardSet => Message::ClipboardSet { data: r.string()? },
        MessageType::ClipboardGet => Message::ClipboardGet,
        MessageType::ClipboardData => Message::ClipboardData { data: r.string()? },
        MessageType::ThemeUpdate => Message::ThemeUpdate { theme_json: r.string()? },
        MessageType::ThemeAck => Message::ThemeAck { theme_json: r.string()? },
        MessageType::Ping => Message::Ping { timestamp: r.u64()? },
        MessageType::Pong => Message::Pong { timestamp: r.u64()? },
        MessageType::TreeSnapshot => {
            let pane_count = r.u32()?;
            let mut panes = Vec::with_capacity(pane_count as usize);
            for _ in 0..pane_count {
                panes.push(r.pane_snapshot()?);
            }
            let root = r.tree_node()?;
            Message::TreeSnapshot { panes, root }
        }
        MessageType::BufferDelta => Message::BufferDelta(r.buffer_delta()?),
        MessageType::BufferAck => Message::BufferAck { acked_sequence: Sequence::new(r.u64()?) },
        MessageType::PaneFocus => Message::PaneFocus { pane_id: r.pane_id()? },
        MessageType::PaneState => Message::PaneState {
            pane_id: r.pane_id()?,
            flags: r.u8()?,
            z_order: r.i32()?,
        },
        MessageType::StateUpdate => {
            let active_workspace_id = r.i32()?;
            let count = r.u32()?;
            let mut all_workspaces = Vec::with_capacity(count as usize);
            for _ in 0..count {
                all_workspaces.push(r.i32()?);
            }
            Message::StateUpdate {
                active_workspace_id,
                all_workspaces,
                in_control_mode: r.bool()?,
                sub_mode: r.string()?,
                active_title: r.string()?,
                desktop_bg_rgb: r.u32()?,
            }
        }
    };
    Ok(message)
}

/// Recursively encode a tree node: a 1-byte presence tag (`NIL_NODE` for
/// absent, else a present-node marker), the pane index as `i32` (-1 for an
/// internal node), the split discriminant, the split ratios, and the
/// children. The same shape is reused by the snapshot store's content hash
/// (§4.4).
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn session_id(&mut self, id: SessionId) {
        self.buf.extend_from_slice(&id.to_be_bytes());
    }

    fn pane_id(&mut self, id: PaneId) {
        self.buf.extend_from_slice(&id.to_be_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn pane_snapshot(&mut self, pane: &PaneSnapshotWire) {
        self.pane_id(pane.pane_id);
        self.string(&pane.title);
        self.u32(pane.rows.len() as u32);
        for row in &pane.rows {
            self.string(row);
        }
        self.i32(pane.x);
        self.i32(pane.y);
        self.i32(pane.w);
        self.i32(pane.h);
        self.string(&pane.app_type);
        self.string(&pane.app_config);
    }

    fn tree_node(&mut self, node: Option<&TreeNodeCapture>) {
        let Some(node) = node else {
            self.u8(NIL_NODE);
            return;
        };
        self.u8(0); // present-node tag, distinct from NIL_NODE
        self.i32(node.pane_index.map_or(-1, |i| i as i32));
        self.u8(node.split.discriminant());
        self.u16(node.split_ratios.len() as u16);
        for ratio in &node.split_ratios {
            self.f64(*ratio);
        }
        self.u16(node.children.len() as u16);
        for child in &node.children {
            self.tree_node(Some(child));
        }
    }

    fn style_entry(&mut self, style: &StyleEntry) {
        self.u8(style.attr_flags);
        self.u8(style.fg.model as u8);
        self.u32(style.fg.value);
        self.u8(style.bg.model as u8);
        self.u32(style.bg.value);
    }

    fn cell_span(&mut self, span: &CellSpan) {
        self.u32(span.start_col);
        self.u32(span.style_index);
        self.string(&span.text);
    }

    fn row_delta(&mut self, row: &RowDelta) {
        self.u32(row.row_index);
        self.u32(row.spans.len() as u32);
        for span in &row.spans {
            self.cell_span(span);
        }
    }

    fn buffer_delta(&mut self, delta: &BufferDelta) {
        self.pane_id(delta.pane_id);
        self.u32(delta.revision);
        self.u8(delta.flags);
        self.u32(delta.style_table.len() as u32);
        for style in &delta.style_table {
            self.style_entry(style);
        }
        self.u32(delta.row_deltas.len() as u32);
        for row in &delta.row_deltas {
            self.row_delta(row);
        }
    }
}

/// Mirror-image reader for `Writer`; every method returns
/// `CodecError::Truncated` or `CodecError::InvalidField` on malformed input
/// rather than panicking, since payload bytes are attacker-controlled.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() - self.pos < len {
            return Err(CodecError::Truncated {
                expected: self.pos + len,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn session_id(&mut self) -> Result<SessionId, CodecError> {
        Ok(SessionId::from_be_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn pane_id(&mut self) -> Result<PaneId, CodecError> {
        Ok(PaneId::from_be_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidField {
            field: "string",
            reason: "not valid UTF-8".to_string(),
        })
    }

    fn pane_snapshot(&mut self) -> Result<PaneSnapshotWire, CodecError> {
        let pane_id = self.pane_id()?;
        let title = self.string()?;
        let row_count = self.u32()?;
        let mut rows = Vec::with_capacity(row_count as usize);
        for _ in 0..row_count {
            rows.push(self.string()?);
        }
        Ok(PaneSnapshotWire {
            pane_id,
            title,
            rows,
            x: self.i32()?,
            y: self.i32()?,
            w: self.i32()?,
            h: self.i32()?,
            app_type: self.string()?,
            app_config: self.string()?,
        })
    }

    fn tree_node(&mut self) -> Result<Option<TreeNodeCapture>, CodecError> {
        let tag = self.u8()?;
        if tag == NIL_NODE {
            return Ok(None);
        }
        let pane_index = self.i32()?;
        let split = Split::from_discriminant(self.u8()?).ok_or(CodecError::InvalidField {
            field: "tree_node.split",
            reason: "unknown split discriminant".to_string(),
        })?;
        let ratio_count = self.u16()?;
        let mut split_ratios = Vec::with_capacity(ratio_count as usize);
        for _ in 0..ratio_count {
            split_ratios.push(self.f64()?);
        }
        let child_count = self.u16()?;
        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            children.push(
                self.tree_node()?
                    .ok_or(CodecError::InvalidField {
                        field: "tree_node.children",
                        reason: "child node cannot be nil".to_string(),
                    })?,
            );
        }
        Ok(Some(TreeNodeCapture {
            pane_index: if pane_index < 0 { None } else { Some(pane_index as usize) },
            split,
            split_ratios,
            children,
        }))
    }

    fn style_entry(&mut self) -> Result<StyleEntry, CodecError> {
        use crate::model::Color;
        let attr_flags = self.u8()?;
        let fg_model = color_model_from_u8(self.u8()?)?;
        let fg_value = self.u32()?;
        let bg_model = color_model_from_u8(self.u8()?)?;
        let bg_value = self.u32()?;
        Ok(StyleEntry {
            attr_flags,
            fg: Color { model: fg_model, value: fg_value },
            bg: Color { model: bg_model, value: bg_value },
        })
    }

    fn cell_span(&mut self) -> Result<CellSpan, CodecError> {
        Ok(CellSpan {
            start_col: self.u32()?,
            style_index: self.u32()?,
            text: self.string()?,
        })
    }

    fn row_delta(&mut self) -> Result<RowDelta, CodecError> {
        let row_index = self.u32()?;
        let span_count = self.u32()?;
        let mut spans = Vec::with_capacity(span_count as usize);
        for _ in 0..span_count {
            spans.push(self.cell_span()?);
        }
        Ok(RowDelta { row_index, spans })
    }

    fn buffer_delta(&mut self) -> Result<BufferDelta, CodecError> {
        let pane_id = self.pane_id()?;
        let revision = self.u32()?;
        let flags = self.u8()?;
        let style_count = self.u32()?;
        let mut style_table = Vec::with_capacity(style_count as usize);
        for _ in 0..style_count {
            style_table.push(self.style_entry()?);
        }
        let row_count = self.u32()?;
        let mut row_deltas = Vec::with_capacity(row_count as usize);
        for _ in 0..row_count {
            row_deltas.push(self.row_delta()?);
        }
        Ok(BufferDelta {
            pane_id,
            revision,
            flags,
            style_table,
            row_deltas,
        })
    }
}

fn color_model_from_u8(value: u8) -> Result<crate::model::ColorModel, CodecError> {
    use crate::model::ColorModel;
    match value {
        0 => Ok(ColorModel::Default),
        1 => Ok(ColorModel::Rgb),
        other => Err(CodecError::InvalidField {
            field: "color_model",
            reason: format!("unknown color model discriminant {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, PaneState as ModelPaneState};

    fn round_trip(message: Message) -> Message {
        let frame = encode_frame(SessionId::from_u128(7), Sequence::new(3), &message, true);
        let (header, decoded) = decode_frame(&frame).expect("decode");
        assert_eq!(header.session_id, SessionId::from_u128(7));
        assert_eq!(header.sequence, Sequence::new(3));
        assert_eq!(header.msg_type, message.message_type());
        decoded
    }

    #[test]
    fn header_has_correct_magic_and_length() {
        let frame = encode_frame(
            SessionId::ZERO,
            Sequence::zero(),
            &Message::ClipboardGet,
            false,
        );
        assert!(frame.len() >= HEADER_LEN);
        assert_eq!(&frame[0..4], &MAGIC);
        assert_eq!(frame[4], PROTOCOL_VERSION);
    }

    #[test]
    fn hello_round_trips() {
        let msg = round_trip(Message::Hello { client_name: "tui-client".into() });
        assert_eq!(msg, Message::Hello { client_name: "tui-client".into() });
    }

    #[test]
    fn empty_string_round_trips() {
        let msg = round_trip(Message::Hello { client_name: String::new() });
        assert_eq!(msg, Message::Hello { client_name: String::new() });
    }

    #[test]
    fn unicode_payload_round_trips() {
        let msg = round_trip(Message::Paste { data: "héllo 🦀 world".into() });
        assert_eq!(msg, Message::Paste { data: "héllo 🦀 world".into() });
    }

    #[test]
    fn connect_request_round_trips_session_id() {
        let sid = SessionId::random();
        let msg = round_trip(Message::ConnectRequest { session_id: sid });
        assert_eq!(msg, Message::ConnectRequest { session_id: sid });
    }

    #[test]
    fn key_event_round_trips() {
        let msg = round_trip(Message::KeyEvent {
            key_code: 65,
            rune_value: -1,
            modifiers: 0b101,
        });
        assert_eq!(
            msg,
            Message::KeyEvent { key_code: 65, rune_value: -1, modifiers: 0b101 }
        );
    }

    #[test]
    fn resize_round_trips() {
        let msg = round_trip(Message::Resize { cols: 120, rows: 40 });
        assert_eq!(msg, Message::Resize { cols: 120, rows: 40 });
    }

    #[test]
    fn ping_pong_round_trip() {
        assert_eq!(round_trip(Message::Ping { timestamp: 42 }), Message::Ping { timestamp: 42 });
        assert_eq!(round_trip(Message::Pong { timestamp: 42 }), Message::Pong { timestamp: 42 });
    }

    #[test]
    fn state_update_round_trips_with_empty_workspace_list() {
        let msg = round_trip(Message::StateUpdate {
            active_workspace_id: 1,
            all_workspaces: vec![],
            in_control_mode: true,
            sub_mode: "copy-mode".into(),
            active_title: "bash".into(),
            desktop_bg_rgb: 0x00_11_22_33,
        });
        assert!(matches!(msg, Message::StateUpdate { sub_mode, .. } if sub_mode == "copy-mode"));
    }

    #[test]
    fn pane_state_round_trips_flags_and_z_order() {
        let state = ModelPaneState { active: true, resizing: false, z_order: 5, handles_selection: true };
        let msg = round_trip(Message::PaneState {
            pane_id: PaneId::from_u128(9),
            flags: state.to_flags(),
            z_order: state.z_order,
        });
        match msg {
            Message::PaneState { pane_id, flags, z_order } => {
                assert_eq!(pane_id, PaneId::from_u128(9));
                assert_eq!(ModelPaneState::from_flags(flags, z_order), state);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn buffer_delta_round_trips_with_style_table() {
        let delta = BufferDelta {
            pane_id: PaneId::from_u128(3),
            revision: 4,
            flags: crate::model::buffer_delta_flag::FULL_CONTENT,
            style_table: vec![StyleEntry {
                attr_flags: 0,
                fg: Color::rgb(0xff0000),
                bg: Color::default_color(),
            }],
            row_deltas: vec![RowDelta {
                row_index: 0,
                spans: vec![CellSpan { start_col: 0, style_index: 0, text: "hi".into() }],
            }],
        };
        let msg = round_trip(Message::BufferDelta(delta.clone()));
        assert_eq!(msg, Message::BufferDelta(delta));
    }

    #[test]
    fn tree_snapshot_round_trips_with_nested_splits() {
        let root = TreeNodeCapture {
            pane_index: None,
            split: Split::Vertical,
            split_ratios: vec![0.5],
            children: vec![
                TreeNodeCapture { pane_index: Some(0), split: Split::None, split_ratios: vec![], children: vec![] },
                TreeNodeCapture { pane_index: Some(1), split: Split::None, split_ratios: vec![], children: vec![] },
            ],
        };
        let panes = vec![
            PaneSnapshotWire {
                pane_id: PaneId::from_u128(1),
                title: "top".into(),
                rows: vec!["$ ls".into()],
                x: 0,
                y: 0,
                w: 80,
                h: 12,
                app_type: "shell".into(),
                app_config: "{}".into(),
            },
            PaneSnapshotWire {
                pane_id: PaneId::from_u128(2),
                title: "bottom".into(),
                rows: vec![],
                x: 0,
                y: 12,
                w: 80,
                h: 12,
                app_type: "shell".into(),
                app_config: "{}".into(),
            },
        ];
        let msg = round_trip(Message::TreeSnapshot { panes: panes.clone(), root: Some(root.clone()) });
        assert_eq!(msg, Message::TreeSnapshot { panes, root: Some(root) });
    }

    #[test]
    fn tree_snapshot_round_trips_with_absent_root() {
        let msg = round_trip(Message::TreeSnapshot { panes: vec![], root: None });
        assert_eq!(msg, Message::TreeSnapshot { panes: vec![], root: None });
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut frame = encode_frame(SessionId::ZERO, Sequence::zero(), &Message::ClipboardGet, false);
        frame[0] = 0;
        assert_eq!(decode_header(&frame).unwrap_err(), CodecError::BadMagic);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut frame = encode_frame(SessionId::ZERO, Sequence::zero(), &Message::ClipboardGet, false);
        frame[4] = 99;
        assert_eq!(decode_header(&frame).unwrap_err(), CodecError::UnsupportedVersion(99));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut frame = encode_frame(SessionId::ZERO, Sequence::zero(), &Message::ClipboardGet, false);
        frame[5] = 250;
        assert_eq!(decode_header(&frame).unwrap_err(), CodecError::UnknownMessageType(250));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = decode_header(&[0u8; 10]).unwrap_err();
        assert_eq!(err, CodecError::Truncated { expected: HEADER_LEN, actual: 10 });
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let mut frame = encode_frame(
            SessionId::ZERO,
            Sequence::zero(),
            &Message::Hello { client_name: "x".into() },
            true,
        );
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(matches!(decode_frame(&frame), Err(CodecError::ChecksumMismatch { .. })));
    }

    #[test]
    fn checksum_not_verified_when_flag_unset() {
        let mut frame = encode_frame(
            SessionId::ZERO,
            Sequence::zero(),
            &Message::Hello { client_name: "x".into() },
            false,
        );
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(decode_frame(&frame).is_ok());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let frame = encode_frame(
            SessionId::ZERO,
            Sequence::zero(),
            &Message::Hello { client_name: "longer-than-truncated".into() },
            false,
        );
        let truncated = &frame[..frame.len() - 5];
        assert!(matches!(decode_frame(truncated), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn invalid_utf8_string_is_rejected() {
        let mut frame = encode_frame(
            SessionId::ZERO,
            Sequence::zero(),
            &Message::Hello { client_name: "ok".into() },
            false,
        );
        let payload_start = HEADER_LEN;
        frame[payload_start + 4] = 0xff; // corrupt first string byte
        assert!(matches!(
            decode_frame(&frame),
            Err(CodecError::InvalidField { field: "string", .. })
        ));
    }
}
