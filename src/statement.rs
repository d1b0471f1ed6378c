//! Prepared-statement state: descriptors, codec binding, Bind encoding and
//! row decoding.
use bytes::{Buf, Bytes};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::codec::{Codec, DataCodecs, DataError, builtin};
use crate::common::ByteStr;
use crate::error::{InterfaceError, Result};
use crate::ext::UsizeExt;
use crate::io::{ReadBuffer, WriteBuffer};
use crate::postgres::{Oid, PgFormat, ProtocolError, oid};
use crate::value::Value;

type AtomicId = std::sync::atomic::AtomicU16;

/// A fixed-width generated wire name.
#[derive(Clone, PartialEq, Eq)]
pub struct Id([u8; 6]);

impl Id {
    pub(crate) fn unnamed() -> Self {
        Self([b'?'; 6])
    }

    pub(crate) fn next(atomic: &AtomicId) -> Self {
        let id = atomic.fetch_add(1, Ordering::SeqCst);
        let mut buf = [b'q', b'0', b'0', b'0', b'0', b'0'];
        let len = buf.len();

        let mut b = itoa::Buffer::new();
        let id = b.format(id);
        let i = id.as_bytes();
        buf[len - i.len()..].copy_from_slice(i);

        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        if self.is_unnamed() {
            return "";
        }
        // SAFETY: string only construction and is immutable
        unsafe { std::str::from_utf8_unchecked(&self.0[..]) }
    }

    pub fn is_unnamed(&self) -> bool {
        self.0[0] == b'?'
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

macro_rules! delegate {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(Id);

        impl $name {
            pub fn unnamed() -> Self {
                Self(Id::unnamed())
            }

            pub fn next() -> Self {
                static ID: AtomicId = AtomicId::new(0);
                Self(Id::next(&ID))
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

delegate!(StatementName);
delegate!(PortalName);

/// One column of a `RowDescription`.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    /// The field name.
    pub name: ByteStr,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero.
    pub table_oid: u32,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub column_num: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see pg_type.typlen).
    /// Note that negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod).
    pub type_mod: i32,
    /// The format code being used for the field. In a RowDescription
    /// returned from the statement variant of Describe, the format is not
    /// yet known and will always be text.
    pub format: PgFormat,
}

/// A parsed row descriptor with per-column codecs bound.
#[derive(Debug, Default)]
pub struct RowSchema {
    columns: Vec<ColumnDesc>,
    codecs: Vec<Arc<Codec>>,
    /// format each column will actually arrive in
    formats: Vec<PgFormat>,
    index: HashMap<ByteStr, usize>,
}

impl RowSchema {
    /// Parse a `RowDescription` body.
    pub fn parse(body: Bytes) -> Result<Self> {
        let mut parser = ReadBuffer::message(body);
        let count = parser.read_int16()?;
        let mut columns = Vec::with_capacity(count.max(0) as usize);
        let mut index = HashMap::with_capacity(columns.capacity());
        for i in 0..count {
            let name = ByteStr::from_utf8(parser.read_cstr()?).map_err(ProtocolError::non_utf8)?;
            let column = ColumnDesc {
                name: name.clone(),
                table_oid: parser.read_int32()? as u32,
                column_num: parser.read_int16()?,
                type_oid: parser.read_int32()? as u32,
                type_size: parser.read_int16()?,
                type_mod: parser.read_int32()?,
                format: PgFormat::from_code(parser.read_int16()?)?,
            };
            columns.push(column);
            // first column wins on duplicate names
            index.entry(name).or_insert(i as usize);
        }
        parser.discard_message();
        Ok(Self { columns, codecs: Vec::new(), formats: Vec::new(), index })
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn missing_types(&self, codecs: &mut DataCodecs, out: &mut HashSet<Oid>) {
        for column in &self.columns {
            if codecs.lookup(column.type_oid).is_none() {
                out.insert(column.type_oid);
            }
        }
    }

    /// Bind column codecs.
    ///
    /// With `from_descriptor` the arrival format is the descriptor's code
    /// (the simple-query path); otherwise it is the codec's preferred
    /// format, the one Bind requested. `lenient` decodes unresolvable oids
    /// as raw text instead of failing, which is all the simple-query path
    /// can do.
    fn bind_codecs(
        &mut self,
        codecs: &mut DataCodecs,
        from_descriptor: bool,
        lenient: bool,
    ) -> Result<()> {
        self.codecs = Vec::with_capacity(self.columns.len());
        self.formats = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let codec = match codecs.lookup(column.type_oid) {
                Some(codec) => codec,
                None if lenient => Arc::clone(builtin(oid::UNKNOWN).expect("unknown is built-in")),
                None => return Err(InterfaceError::TypesUnresolved.into()),
            };
            self.formats.push(if from_descriptor { column.format } else { codec.format() });
            self.codecs.push(codec);
        }
        Ok(())
    }

    /// Bind codecs for a simple-query result set: formats come from the
    /// descriptor, unresolvable oids decode as raw text.
    pub(crate) fn bind_codecs_for_simple_query(&mut self, codecs: &mut DataCodecs) -> Result<()> {
        self.bind_codecs(codecs, true, true)
    }

    /// Whether any bound column travels in text format.
    fn have_text_cols(&self) -> bool {
        self.formats.contains(&PgFormat::Text)
    }

    /// Decode a `DataRow` body against the bound codecs.
    pub fn decode_row(&self, mut body: Bytes) -> Result<Vec<Value>> {
        if self.codecs.len() != self.columns.len() {
            return Err(InterfaceError::TypesUnresolved.into());
        }
        if body.len() < 2 {
            return Err(ProtocolError::ShortRead.into());
        }
        let fnum = body.get_i16();
        if fnum as usize != self.columns.len() {
            return Err(ProtocolError::unexpected(b'D', "row field count").into());
        }

        let mut values = Vec::with_capacity(self.columns.len());
        for (codec, format) in self.codecs.iter().zip(&self.formats) {
            if body.len() < 4 {
                return Err(ProtocolError::ShortRead.into());
            }
            let len = body.get_i32();
            let payload = match len {
                -1 => None,
                len if len < 0 || body.len() < len as usize => {
                    return Err(ProtocolError::ShortRead.into());
                }
                len => Some(body.split_to(len as usize)),
            };
            values.push(codec.decode_field(*format, payload)?);
        }

        if !body.is_empty() {
            return Err(ProtocolError::unexpected(b'D', "row trailing bytes").into());
        }
        Ok(values)
    }
}

/// Server-side prepared statement state.
///
/// Produced by the prepare operation; holds the parameter and row
/// descriptors, the resolved codec tuples, and the portal reference count.
/// The descriptor lists are immutable once set.
#[derive(Debug)]
pub struct PreparedStatement {
    name: ByteStr,
    query: ByteStr,
    param_oids: Vec<Oid>,
    arg_codecs: Vec<Arc<Codec>>,
    schema: RowSchema,
    have_text_args: bool,
    closed: Cell<bool>,
    refs: Cell<u32>,
}

impl PreparedStatement {
    pub(crate) fn new(name: ByteStr, query: ByteStr) -> Self {
        Self {
            name,
            query,
            param_oids: Vec::new(),
            arg_codecs: Vec::new(),
            schema: RowSchema::default(),
            have_text_args: false,
            closed: Cell::new(false),
            refs: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param_oids(&self) -> &[Oid] {
        &self.param_oids
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        self.schema.columns()
    }

    /// Index of a result column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.column_index(name)
    }

    /// Parse a `ParameterDescription` body: `int16 count` then one oid per
    /// parameter.
    pub(crate) fn set_param_desc(&mut self, body: Bytes) -> Result<()> {
        let mut parser = ReadBuffer::message(body);
        let count = parser.read_int16()?;
        self.param_oids = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            self.param_oids.push(parser.read_int32()? as u32);
        }
        parser.discard_message();
        Ok(())
    }

    /// Parse a `RowDescription` body; `None` is the `NoData` case.
    pub(crate) fn set_row_desc(&mut self, body: Option<Bytes>) -> Result<()> {
        self.schema = match body {
            Some(body) => RowSchema::parse(body)?,
            None => RowSchema::default(),
        };
        Ok(())
    }

    /// The oids with no registered codec.
    ///
    /// The connection layer introspects these and registers the result,
    /// then calls [`init_codecs`][Self::init_codecs]; an empty set means
    /// the statement can bind immediately.
    pub fn init_types(&self, codecs: &mut DataCodecs) -> HashSet<Oid> {
        let mut missing = HashSet::new();
        for oid in &self.param_oids {
            if codecs.lookup(*oid).is_none() {
                missing.insert(*oid);
            }
        }
        self.schema.missing_types(codecs, &mut missing);
        missing
    }

    /// Bind argument and row codecs from the registry.
    pub fn init_codecs(&mut self, codecs: &mut DataCodecs) -> Result<()> {
        self.arg_codecs = Vec::with_capacity(self.param_oids.len());
        for oid in &self.param_oids {
            let codec = codecs.lookup(*oid).ok_or(InterfaceError::TypesUnresolved)?;
            self.arg_codecs.push(codec);
        }
        self.have_text_args = self.arg_codecs.iter().any(|c| c.format() == PgFormat::Text);
        self.schema.bind_codecs(codecs, false, false)
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.arg_codecs.len() == self.param_oids.len()
            && self.schema.codecs.len() == self.schema.columns.len()
    }

    /// Encode the body of a Bind message.
    ///
    /// The compact format array `int32 0x00010001` ("one format code,
    /// binary, applied to all") is used unless a text codec is bound on
    /// that side.
    pub fn encode_bind(&self, portal: &str, args: &[Value]) -> Result<WriteBuffer> {
        self.check_open()?;
        if !self.is_ready() {
            return Err(InterfaceError::TypesUnresolved.into());
        }
        if args.len() != self.param_oids.len() {
            return Err(DataError::ArgumentCount {
                expected: self.param_oids.len(),
                got: args.len(),
            }
            .into());
        }

        let mut buf = WriteBuffer::new();
        buf.write_str(portal);
        buf.write_str(&self.name);

        if self.have_text_args {
            buf.write_int16(self.arg_codecs.len().to_u16() as i16);
            for codec in &self.arg_codecs {
                buf.write_int16(codec.format().format_code());
            }
        } else {
            buf.write_int32(0x0001_0001);
        }

        buf.write_int16(args.len().to_u16() as i16);
        for (codec, arg) in self.arg_codecs.iter().zip(args) {
            codec.encode_field(arg, &mut buf)?;
        }

        if self.schema.have_text_cols() {
            buf.write_int16(self.schema.formats.len().to_u16() as i16);
            for format in &self.schema.formats {
                buf.write_int16(format.format_code());
            }
        } else {
            buf.write_int32(0x0001_0001);
        }

        Ok(buf)
    }

    /// Decode a `DataRow` body against the bound row codecs.
    pub fn decode_row(&self, body: Bytes) -> Result<Vec<Value>> {
        self.check_open()?;
        self.schema.decode_row(body)
    }

    /// Portal reference counting; a statement cannot close while a portal
    /// depends on it.
    pub fn attach(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    pub fn detach(&self) {
        let refs = self.refs.get();
        debug_assert!(refs > 0, "detach without attach");
        self.refs.set(refs.saturating_sub(1));
    }

    pub fn refs(&self) -> u32 {
        self.refs.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// One-shot: after this, every operation on the statement is refused.
    pub(crate) fn mark_closed(&self) {
        self.closed.set(true);
    }

    pub(crate) fn check_open(&self) -> Result<(), InterfaceError> {
        if self.closed.get() {
            return Err(InterfaceError::StatementClosed);
        }
        Ok(())
    }

    pub(crate) fn check_closable(&self) -> Result<(), InterfaceError> {
        self.check_open()?;
        match self.refs.get() {
            0 => Ok(()),
            n => Err(InterfaceError::StatementInUse(n)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row_desc(fields: &[(&str, Oid, i16)]) -> Bytes {
        let mut buf = WriteBuffer::new();
        buf.write_int16(fields.len() as i16);
        for (name, type_oid, format) in fields {
            buf.write_str(name);
            buf.write_int32(0); // table oid
            buf.write_int16(0); // column number
            buf.write_uint32(*type_oid);
            buf.write_int16(-1); // type size
            buf.write_int32(-1); // type modifier
            buf.write_int16(*format);
        }
        buf.take()
    }

    fn param_desc(oids: &[Oid]) -> Bytes {
        let mut buf = WriteBuffer::new();
        buf.write_int16(oids.len() as i16);
        for oid in oids {
            buf.write_uint32(*oid);
        }
        buf.take()
    }

    fn add_statement() -> PreparedStatement {
        let mut stmt = PreparedStatement::new(
            ByteStr::from_static("q00001"),
            ByteStr::from_static("SELECT $1::int4 + $2::int4 AS sum"),
        );
        stmt.set_param_desc(param_desc(&[oid::INT4, oid::INT4])).unwrap();
        stmt.set_row_desc(Some(row_desc(&[("sum", oid::INT4, 0)]))).unwrap();
        let mut codecs = DataCodecs::new();
        assert!(stmt.init_types(&mut codecs).is_empty());
        stmt.init_codecs(&mut codecs).unwrap();
        stmt
    }

    #[test]
    fn statement_names_are_generated() {
        let a = StatementName::next();
        let b = StatementName::next();
        assert_ne!(a.as_str(), b.as_str());
        assert!(a.as_str().starts_with('q'));
        assert_eq!(StatementName::unnamed().as_str(), "");
    }

    #[test]
    fn descriptors_parse() {
        let stmt = add_statement();
        assert_eq!(stmt.param_oids(), &[oid::INT4, oid::INT4]);
        assert_eq!(stmt.columns().len(), 1);
        assert_eq!(stmt.columns()[0].name, "sum");
        assert_eq!(stmt.columns()[0].type_oid, oid::INT4);
        assert_eq!(stmt.column_index("sum"), Some(0));
        assert_eq!(stmt.column_index("nope"), None);
    }

    #[test]
    fn bind_body_compact_formats() {
        let stmt = add_statement();
        let body = stmt.encode_bind("", &[2.into(), 3.into()]).unwrap();

        let mut expect = WriteBuffer::new();
        expect.write_str(""); // portal
        expect.write_str("q00001"); // statement
        expect.write_int32(0x0001_0001); // all-binary parameter formats
        expect.write_int16(2);
        expect.write_int32(4);
        expect.write_int32(2);
        expect.write_int32(4);
        expect.write_int32(3);
        expect.write_int32(0x0001_0001); // all-binary result formats
        assert_eq!(body.as_slice(), expect.as_slice());
    }

    #[test]
    fn bind_null_is_minus_one(){
        let mut stmt = PreparedStatement::new(ByteStr::default(), ByteStr::from_static("SELECT $1::text"));
        stmt.set_param_desc(param_desc(&[oid::TEXT])).unwrap();
        stmt.set_row_desc(Some(row_desc(&[("text", oid::TEXT, 0)]))).unwrap();
        let mut codecs = DataCodecs::new();
        stmt.init_codecs(&mut codecs).unwrap();

        let body = stmt.encode_bind("", &[Value::Null]).unwrap();
        let b = body.as_slice();
        // portal "" + stmt "" + compact formats + nargs + the NULL field
        let mut expect = WriteBuffer::new();
        expect.write_str("");
        expect.write_str("");
        expect.write_int32(0x0001_0001);
        expect.write_int16(1);
        expect.write_int32(-1);
        expect.write_int32(0x0001_0001);
        assert_eq!(b, expect.as_slice());
    }

    #[test]
    fn bind_expands_formats_with_text_codec() {
        // numeric is a text-format codec
        let mut stmt = PreparedStatement::new(ByteStr::default(), ByteStr::from_static("SELECT $1::numeric"));
        stmt.set_param_desc(param_desc(&[oid::NUMERIC])).unwrap();
        stmt.set_row_desc(Some(row_desc(&[("n", oid::NUMERIC, 0)]))).unwrap();
        let mut codecs = DataCodecs::new();
        stmt.init_codecs(&mut codecs).unwrap();

        let body = stmt.encode_bind("", &[Value::Numeric(ByteStr::from_static("1.5"))]).unwrap();
        let b = body.as_slice();
        // two empty names, then expanded formats: count 1, code 0
        assert_eq!(&b[2..6], &[0, 1, 0, 0]);
        // result formats at the tail, also expanded to text
        assert_eq!(&b[b.len() - 4..], &[0, 1, 0, 0]);
    }

    #[test]
    fn bind_argument_count_must_match() {
        let stmt = add_statement();
        assert!(stmt.encode_bind("", &[2.into()]).is_err());
    }

    #[test]
    fn decode_row_matches_descriptor() {
        let stmt = add_statement();

        let mut row = WriteBuffer::new();
        row.write_int16(1);
        row.write_int32(4);
        row.write_int32(5);
        let values = stmt.decode_row(row.take()).unwrap();
        assert_eq!(values, vec![Value::Int4(5)]);

        // mismatched column count is a protocol error
        let mut row = WriteBuffer::new();
        row.write_int16(2);
        row.write_int32(4);
        row.write_int32(5);
        row.write_int32(-1);
        assert!(stmt.decode_row(row.take()).is_err());

        // trailing bytes after the last field are refused
        let mut row = WriteBuffer::new();
        row.write_int16(1);
        row.write_int32(4);
        row.write_int32(5);
        row.write_byte(0);
        assert!(stmt.decode_row(row.take()).is_err());
    }

    #[test]
    fn null_field_decodes_to_null() {
        let stmt = add_statement();
        let mut row = WriteBuffer::new();
        row.write_int16(1);
        row.write_int32(-1);
        assert_eq!(stmt.decode_row(row.take()).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn refcount_gates_close() {
        let stmt = add_statement();
        stmt.attach();
        assert!(matches!(stmt.check_closable(), Err(InterfaceError::StatementInUse(1))));
        stmt.detach();
        stmt.check_closable().unwrap();

        stmt.mark_closed();
        assert!(stmt.encode_bind("", &[2.into(), 3.into()]).is_err());
    }
}
