//! Oid → codec resolution.
//!
//! Three layers, searched in order: the process-wide built-in table
//! (populated once, immutable after init), per-session user overrides, and
//! a cross-session cache of introspected types keyed by
//! `(server_address, database)`.
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex};

use super::{Codec, DecodeFn, EncodeFn, Scalar, TextDecodeFn};
use super::{geometric, network, scalar, temporal, text};
use crate::common::ByteStr;
use crate::error::InterfaceError;
use crate::postgres::{Oid, PgFormat, oid};

/// Bound on the per-session resolved-codec cache.
const SESSION_CACHE_CAP: usize = 256;

static BUILTINS: LazyLock<Vec<Option<Arc<Codec>>>> = LazyLock::new(build_table);

/// Look up a built-in codec by oid.
pub fn builtin(oid: Oid) -> Option<&'static Arc<Codec>> {
    BUILTINS.get(oid as usize)?.as_ref()
}

fn build_table() -> Vec<Option<Arc<Codec>>> {
    let mut table: Vec<Option<Arc<Codec>>> = vec![None; oid::MAX_BUILTIN_OID as usize + 1];

    let binary = |encode: EncodeFn, decode: DecodeFn, decode_text: TextDecodeFn| Scalar {
        format: PgFormat::Binary,
        encode,
        decode,
        decode_text,
    };
    let verbatim = Scalar::text(text::encode_verbatim, text::decode_verbatim_text);

    let scalars: &[(Oid, Scalar)] = &[
        (oid::BOOL, binary(scalar::encode_bool, scalar::decode_bool, scalar::decode_bool_text)),
        (oid::BYTEA, binary(scalar::encode_bytea, scalar::decode_bytea, scalar::decode_bytea_text)),
        (oid::CHAR, binary(scalar::encode_char, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::NAME, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::INT8, binary(scalar::encode_int8, scalar::decode_int8, scalar::decode_int8_text)),
        (oid::INT2, binary(scalar::encode_int2, scalar::decode_int2, scalar::decode_int2_text)),
        (oid::INT4, binary(scalar::encode_int4, scalar::decode_int4, scalar::decode_int4_text)),
        (oid::TEXT, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::OID, binary(scalar::encode_oid, scalar::decode_oid, scalar::decode_oid_text)),
        (oid::TID, binary(scalar::encode_tid, scalar::decode_tid, scalar::decode_tid_text)),
        (oid::XID, binary(scalar::encode_oid, scalar::decode_oid, scalar::decode_oid_text)),
        (oid::CID, binary(scalar::encode_oid, scalar::decode_oid, scalar::decode_oid_text)),
        (oid::JSON, binary(scalar::encode_json, scalar::decode_json, scalar::decode_json_text)),
        (oid::XML, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::POINT, binary(geometric::encode_point, geometric::decode_point, text::decode_verbatim_text)),
        (oid::LSEG, binary(geometric::encode_lseg, geometric::decode_lseg, text::decode_verbatim_text)),
        (oid::PATH, binary(geometric::encode_path, geometric::decode_path, text::decode_verbatim_text)),
        (oid::BOX, binary(geometric::encode_box, geometric::decode_box, text::decode_verbatim_text)),
        (oid::POLYGON, binary(geometric::encode_polygon, geometric::decode_polygon, text::decode_verbatim_text)),
        (oid::LINE, binary(geometric::encode_line, geometric::decode_line, text::decode_verbatim_text)),
        (oid::CIDR, binary(network::encode_cidr, network::decode_inet, network::decode_cidr_text)),
        (oid::FLOAT4, binary(scalar::encode_float4, scalar::decode_float4, scalar::decode_float4_text)),
        (oid::FLOAT8, binary(scalar::encode_float8, scalar::decode_float8, scalar::decode_float8_text)),
        (oid::UNKNOWN, Scalar::text(scalar::encode_text_like, scalar::decode_text_value)),
        (oid::CIRCLE, binary(geometric::encode_circle, geometric::decode_circle, text::decode_verbatim_text)),
        (oid::INET, binary(network::encode_inet, network::decode_inet, network::decode_inet_text)),
        (oid::BPCHAR, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::VARCHAR, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::DATE, binary(temporal::encode_date, temporal::decode_date, temporal::decode_date_text)),
        (oid::TIME, binary(temporal::encode_time, temporal::decode_time, temporal::decode_time_text)),
        (oid::TIMESTAMP, binary(temporal::encode_timestamp, temporal::decode_timestamp, temporal::decode_timestamp_text)),
        (oid::TIMESTAMPTZ, binary(temporal::encode_timestamptz, temporal::decode_timestamptz, temporal::decode_timestamptz_text)),
        (oid::INTERVAL, binary(temporal::encode_interval, temporal::decode_interval, text::decode_verbatim_text)),
        (oid::TIMETZ, binary(temporal::encode_timetz, temporal::decode_timetz, temporal::decode_timetz_text)),
        (oid::BIT, binary(scalar::encode_bit, scalar::decode_bit, scalar::decode_bit_text)),
        (oid::VARBIT, binary(scalar::encode_bit, scalar::decode_bit, scalar::decode_bit_text)),
        (oid::NUMERIC, Scalar::text(text::encode_numeric, text::decode_numeric_text)),
        (oid::CSTRING, binary(scalar::encode_text_like, scalar::decode_text_like, scalar::decode_text_value)),
        (oid::VOID, binary(scalar::encode_void, scalar::decode_void, scalar::decode_void_text)),
        (oid::TXID_SNAPSHOT, binary(scalar::encode_txid_snapshot, scalar::decode_txid_snapshot, text::decode_verbatim_text)),
        (oid::UUID, binary(scalar::encode_uuid, scalar::decode_uuid, scalar::decode_uuid_text)),
        (oid::JSONB, binary(scalar::encode_jsonb, scalar::decode_jsonb, scalar::decode_jsonb_text)),
        (oid::JSONPATH, binary(scalar::encode_jsonpath, scalar::decode_jsonpath, scalar::decode_text_value)),
        // text fallbacks
        (oid::INT2VECTOR, verbatim),
        (oid::OIDVECTOR, verbatim),
        (oid::MACADDR8, verbatim),
        (oid::MONEY, verbatim),
        (oid::MACADDR, verbatim),
        (oid::ACLITEM, verbatim),
        (oid::REFCURSOR, verbatim),
        (oid::TSVECTOR, verbatim),
        (oid::TSQUERY, verbatim),
        (oid::GTSVECTOR, verbatim),
    ];

    for (o, s) in scalars {
        let name = oid::type_name(*o).expect("scalar table names a built-in");
        table[*o as usize] = Some(Arc::new(Codec::scalar(*o, name, *s)));
    }

    // the reg* family shares the oid wire form, text accepted on input
    for o in [
        oid::REGPROC,
        oid::REGPROCEDURE,
        oid::REGOPER,
        oid::REGOPERATOR,
        oid::REGCLASS,
        oid::REGTYPE,
        oid::REGCONFIG,
        oid::REGDICTIONARY,
        oid::REGNAMESPACE,
        oid::REGROLE,
    ] {
        let name = oid::type_name(o).expect("reg* family is built-in");
        table[o as usize] = Some(Arc::new(Codec::scalar(
            o,
            name,
            binary(scalar::encode_oid, scalar::decode_oid, scalar::decode_oid_text),
        )));
    }

    // anonymous record: decode only
    table[oid::RECORD as usize] = Some(Arc::new(Codec::composite(
        oid::RECORD,
        ByteStr::from_static("record"),
        ByteStr::from_static("pg_catalog"),
        Vec::new(),
    )));

    for &o in oid::RANGE_OIDS {
        let elem_oid = oid::range_element(o).expect("range set maps to elements");
        let elem = table[elem_oid as usize].clone().expect("range element is built-in");
        let name = oid::type_name(o).expect("range set is built-in");
        table[o as usize] = Some(Arc::new(Codec::range(
            o,
            ByteStr::from_static(name),
            ByteStr::from_static("pg_catalog"),
            elem,
        )));
    }

    for &o in oid::ARRAY_OIDS {
        let elem_oid = oid::array_element(o).expect("array set maps to elements");
        let elem = table[elem_oid as usize].clone().expect("array element is built-in");
        let name = format!("_{}", elem.name());
        table[o as usize] = Some(Arc::new(Codec::array(
            o,
            name.into(),
            ByteStr::from_static("pg_catalog"),
            elem,
        )));
    }

    table
}

/// Key of the shared type cache: `(server_address, database)`.
pub type CacheKey = (ByteStr, ByteStr);

/// Cross-session cache of introspected codecs.
///
/// Mutated only when introspection resolves new oids; entries are never
/// replaced.
#[derive(Clone, Default)]
pub struct SharedTypeCache {
    inner: Arc<Mutex<HashMap<CacheKey, HashMap<Oid, Arc<Codec>>>>>,
}

impl SharedTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &CacheKey, oid: Oid) -> Option<Arc<Codec>> {
        let inner = self.inner.lock().expect("shared type cache poisoned");
        inner.get(key)?.get(&oid).cloned()
    }

    fn insert(&self, key: &CacheKey, codec: Arc<Codec>) {
        let mut inner = self.inner.lock().expect("shared type cache poisoned");
        inner.entry(key.clone()).or_default().entry(codec.oid()).or_insert(codec);
    }
}

impl std::fmt::Debug for SharedTypeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTypeCache").finish_non_exhaustive()
    }
}

/// Per-session codec configuration.
///
/// Owns the local overrides map (user-registered codecs), a bounded cache
/// of resolved codecs, and optionally a handle into the shared
/// cross-session cache.
#[derive(Debug)]
pub struct DataCodecs {
    overrides: HashMap<Oid, Arc<Codec>>,
    cache: LruCache<Oid, Arc<Codec>>,
    shared: Option<(SharedTypeCache, CacheKey)>,
}

impl Default for DataCodecs {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCodecs {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            cache: LruCache::new(NonZeroUsize::new(SESSION_CACHE_CAP).expect("nonzero")),
            shared: None,
        }
    }

    /// Attach the session to a shared cache under its `(address, database)`
    /// key.
    pub fn with_shared(shared: SharedTypeCache, address: ByteStr, database: ByteStr) -> Self {
        Self {
            overrides: HashMap::new(),
            cache: LruCache::new(NonZeroUsize::new(SESSION_CACHE_CAP).expect("nonzero")),
            shared: Some((shared, (address, database))),
        }
    }

    /// Resolve a codec: built-ins, then session overrides, then the shared
    /// cache.
    pub fn lookup(&mut self, oid: Oid) -> Option<Arc<Codec>> {
        if let Some(codec) = builtin(oid) {
            return Some(Arc::clone(codec));
        }
        if let Some(codec) = self.overrides.get(&oid) {
            return Some(Arc::clone(codec));
        }
        if let Some(codec) = self.cache.get(&oid) {
            return Some(Arc::clone(codec));
        }
        let codec = {
            let (shared, key) = self.shared.as_ref()?;
            shared.get(key, oid)?
        };
        self.cache.put(oid, Arc::clone(&codec));
        Some(codec)
    }

    /// Register a user codec on this session.
    ///
    /// Overriding a built-in or an already-registered oid is refused.
    pub fn register(&mut self, codec: Codec) -> Result<(), InterfaceError> {
        let oid = codec.oid();
        if builtin(oid).is_some() {
            return Err(InterfaceError::BuiltinCodec(oid));
        }
        if self.overrides.contains_key(&oid) {
            return Err(InterfaceError::CodecRegistered(oid));
        }
        self.overrides.insert(oid, Arc::new(codec));
        Ok(())
    }

    /// Record a codec produced by catalog introspection.
    ///
    /// Lands in the session cache and, when attached, the shared
    /// cross-session cache. Existing entries are kept; codecs are immortal
    /// once inserted.
    pub fn register_introspected(&mut self, codec: Codec) -> Arc<Codec> {
        let oid = codec.oid();
        if let Some(existing) = self.cache.get(&oid) {
            return Arc::clone(existing);
        }
        let codec = Arc::new(codec);
        if let Some((shared, key)) = &self.shared {
            shared.insert(key, Arc::clone(&codec));
        }
        self.cache.put(oid, Arc::clone(&codec));
        codec
    }
}
