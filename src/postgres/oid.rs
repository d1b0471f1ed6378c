//! Object ids of the built-in postgres types.
//!
//! Values match `pg_type.dat` in the server source; they are stable across
//! server versions.
use super::Oid;

macro_rules! oids {
    ($($(#[$doc:meta])* $name:ident = $oid:literal / $pgname:literal,)*) => {
        $( $(#[$doc])* pub const $name: Oid = $oid; )*

        /// Type name for a built-in oid.
        pub fn type_name(oid: Oid) -> Option<&'static str> {
            Some(match oid {
                $( $oid => $pgname, )*
                _ => return None,
            })
        }
    };
}

oids! {
    BOOL = 16 / "bool",
    BYTEA = 17 / "bytea",
    CHAR = 18 / "char",
    NAME = 19 / "name",
    /// ~18 digit integer, 8-byte storage
    INT8 = 20 / "int8",
    /// -32 thousand to 32 thousand, 2-byte storage
    INT2 = 21 / "int2",
    INT2VECTOR = 22 / "int2vector",
    /// -2 billion to 2 billion integer, 4-byte storage
    INT4 = 23 / "int4",
    REGPROC = 24 / "regproc",
    /// variable-length string, no limit specified
    TEXT = 25 / "text",
    OID = 26 / "oid",
    /// (block, offset), physical location of tuple
    TID = 27 / "tid",
    XID = 28 / "xid",
    CID = 29 / "cid",
    OIDVECTOR = 30 / "oidvector",
    /// JSON stored as text
    JSON = 114 / "json",
    XML = 142 / "xml",
    POINT = 600 / "point",
    LSEG = 601 / "lseg",
    PATH = 602 / "path",
    BOX = 603 / "box",
    POLYGON = 604 / "polygon",
    LINE = 628 / "line",
    CIDR = 650 / "cidr",
    /// single-precision floating point number, 4-byte storage
    FLOAT4 = 700 / "float4",
    /// double-precision floating point number, 8-byte storage
    FLOAT8 = 701 / "float8",
    UNKNOWN = 705 / "unknown",
    CIRCLE = 718 / "circle",
    MACADDR8 = 774 / "macaddr8",
    MONEY = 790 / "money",
    MACADDR = 829 / "macaddr",
    INET = 869 / "inet",
    ACLITEM = 1033 / "aclitem",
    /// char(length), blank-padded string, fixed storage length
    BPCHAR = 1042 / "bpchar",
    /// varchar(length), non-blank-padded string, variable storage length
    VARCHAR = 1043 / "varchar",
    DATE = 1082 / "date",
    TIME = 1083 / "time",
    /// date and time
    TIMESTAMP = 1114 / "timestamp",
    /// date and time with time zone
    TIMESTAMPTZ = 1184 / "timestamptz",
    INTERVAL = 1186 / "interval",
    /// time of day with time zone
    TIMETZ = 1266 / "timetz",
    /// fixed-length bit string
    BIT = 1560 / "bit",
    /// variable-length bit string
    VARBIT = 1562 / "varbit",
    /// numeric(precision, decimal), arbitrary precision number
    NUMERIC = 1700 / "numeric",
    REFCURSOR = 1790 / "refcursor",
    REGPROCEDURE = 2202 / "regprocedure",
    REGOPER = 2203 / "regoper",
    REGOPERATOR = 2204 / "regoperator",
    REGCLASS = 2205 / "regclass",
    REGTYPE = 2206 / "regtype",
    RECORD = 2249 / "record",
    CSTRING = 2275 / "cstring",
    VOID = 2278 / "void",
    UUID = 2950 / "uuid",
    TXID_SNAPSHOT = 2970 / "txid_snapshot",
    TSVECTOR = 3614 / "tsvector",
    TSQUERY = 3615 / "tsquery",
    GTSVECTOR = 3642 / "gtsvector",
    REGCONFIG = 3734 / "regconfig",
    REGDICTIONARY = 3769 / "regdictionary",
    JSONB = 3802 / "jsonb",
    INT4RANGE = 3904 / "int4range",
    NUMRANGE = 3906 / "numrange",
    TSRANGE = 3908 / "tsrange",
    TSTZRANGE = 3910 / "tstzrange",
    DATERANGE = 3912 / "daterange",
    INT8RANGE = 3926 / "int8range",
    JSONPATH = 4072 / "jsonpath",
    REGNAMESPACE = 4089 / "regnamespace",
    REGROLE = 4096 / "regrole",
}

/// Largest oid reserved for built-in types; anything above comes from the
/// catalog of a particular database.
pub const MAX_BUILTIN_OID: Oid = 9999;

/// Element oid for a built-in array oid.
///
/// The array-of-X oids live in a dedicated set in `pg_type.dat`; this is
/// its inverse mapping.
pub fn array_element(array_oid: Oid) -> Option<Oid> {
    Some(match array_oid {
        143 => XML,
        199 => JSON,
        629 => LINE,
        651 => CIDR,
        719 => CIRCLE,
        775 => MACADDR8,
        791 => MONEY,
        1000 => BOOL,
        1001 => BYTEA,
        1002 => CHAR,
        1003 => NAME,
        1005 => INT2,
        1006 => INT2VECTOR,
        1007 => INT4,
        1008 => REGPROC,
        1009 => TEXT,
        1010 => TID,
        1011 => XID,
        1012 => CID,
        1013 => OIDVECTOR,
        1014 => BPCHAR,
        1015 => VARCHAR,
        1016 => INT8,
        1017 => POINT,
        1018 => LSEG,
        1019 => PATH,
        1020 => BOX,
        1021 => FLOAT4,
        1022 => FLOAT8,
        1027 => POLYGON,
        1028 => OID,
        1034 => ACLITEM,
        1040 => MACADDR,
        1041 => INET,
        1115 => TIMESTAMP,
        1182 => DATE,
        1183 => TIME,
        1185 => TIMESTAMPTZ,
        1187 => INTERVAL,
        1231 => NUMERIC,
        1270 => TIMETZ,
        1561 => BIT,
        1563 => VARBIT,
        2201 => REFCURSOR,
        2207 => REGPROCEDURE,
        2208 => REGOPER,
        2209 => REGOPERATOR,
        2210 => REGCLASS,
        2211 => REGTYPE,
        2287 => RECORD,
        2949 => TXID_SNAPSHOT,
        2951 => UUID,
        3643 => TSVECTOR,
        3644 => GTSVECTOR,
        3645 => TSQUERY,
        3735 => REGCONFIG,
        3770 => REGDICTIONARY,
        3807 => JSONB,
        3905 => INT4RANGE,
        3907 => NUMRANGE,
        3909 => TSRANGE,
        3911 => TSTZRANGE,
        3913 => DATERANGE,
        3927 => INT8RANGE,
        4073 => JSONPATH,
        4090 => REGNAMESPACE,
        4097 => REGROLE,
        _ => return None,
    })
}

/// Whether the oid is a built-in array type.
pub fn is_array(oid: Oid) -> bool {
    array_element(oid).is_some()
}

/// All built-in array oids, for table construction.
pub(crate) const ARRAY_OIDS: &[Oid] = &[
    143, 199, 629, 651, 719, 775, 791, 1000, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010,
    1011, 1012, 1013, 1014, 1015, 1016, 1017, 1018, 1019, 1020, 1021, 1022, 1027, 1028, 1034,
    1040, 1041, 1115, 1182, 1183, 1185, 1187, 1231, 1270, 1561, 1563, 2201, 2207, 2208, 2209,
    2210, 2211, 2287, 2949, 2951, 3643, 3644, 3645, 3735, 3770, 3807, 3905, 3907, 3909, 3911,
    3913, 3927, 4073, 4090, 4097,
];

/// Element oid for a built-in range oid.
pub fn range_element(range_oid: Oid) -> Option<Oid> {
    Some(match range_oid {
        INT4RANGE => INT4,
        NUMRANGE => NUMERIC,
        TSRANGE => TIMESTAMP,
        TSTZRANGE => TIMESTAMPTZ,
        DATERANGE => DATE,
        INT8RANGE => INT8,
        _ => return None,
    })
}

/// All built-in range oids, for table construction.
pub(crate) const RANGE_OIDS: &[Oid] = &[INT4RANGE, NUMRANGE, TSRANGE, TSTZRANGE, DATERANGE, INT8RANGE];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_mapping_is_builtin() {
        assert_eq!(array_element(1007), Some(INT4));
        assert_eq!(array_element(1009), Some(TEXT));
        assert_eq!(array_element(16), None);
        assert!(is_array(1231));
        assert!(!is_array(NUMERIC));
    }

    #[test]
    fn names_for_wire_oids() {
        assert_eq!(type_name(23), Some("int4"));
        assert_eq!(type_name(3802), Some("jsonb"));
        assert_eq!(type_name(12345), None);
    }

    #[test]
    fn array_set_matches_mapping() {
        for &a in ARRAY_OIDS {
            assert!(array_element(a).is_some(), "array oid {a} unmapped");
        }
    }
}
