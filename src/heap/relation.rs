//! Table descriptors and the per-type storage table.
//!
//! A [`TabDescriptor`] tells the tuple walker what a relation's rows look
//! like: one [`AttrDescriptor`] per column in declaration order, each with
//! the storage length (`typlen`), alignment code (`typalign`) and type
//! modifier the on-disk format depends on. Descriptors come from the
//! catalog dumps when available, or are built from bare type-name lists
//! (`tab.config`, `--types`) using the built-in storage table.

use std::path::Path;

use crate::PguError;

/// Storage description of one column.
#[derive(Debug, Clone)]
pub struct AttrDescriptor {
    /// Column name.
    pub name: String,
    /// Normalized type name (storage-table key, e.g. `int`, `varchar`).
    pub type_name: String,
    /// Fixed byte length, -1 for varlena, -2 for C strings.
    pub typlen: i16,
    /// Alignment code: `c`, `s`, `i` or `d`.
    pub typalign: u8,
    /// Type modifier (e.g. declared varchar length), -1 when absent.
    pub typmod: i32,
    /// Column was dropped; storage is consumed but the value is discarded.
    pub dropped: bool,
}

/// What a relation's rows look like.
#[derive(Debug, Clone)]
pub struct TabDescriptor {
    /// Relation name (unqualified).
    pub name: String,
    /// Attributes in declaration order, dropped columns included.
    pub attrs: Vec<AttrDescriptor>,
    /// OID of the TOAST sibling relation, when one exists.
    pub toast_relid: Option<u32>,
}

/// Map a source type name onto its standard name.
///
/// Mirrors the aliasing the catalog produces: sized integers fold onto SQL
/// names, text-like types onto `varchar`, and so on.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("uint8", "bigint"),
    ("int8", "bigint"),
    ("int4", "int"),
    ("uint4", "int"),
    ("int2", "smallint"),
    ("uint2", "smallint"),
    ("int1", "tinyint"),
    ("uint1", "tinyint"),
    ("character", "char"),
    ("varchar2", "varchar"),
    ("varcharn", "varchar"),
    ("text", "varchar"),
    ("json", "varchar"),
    ("xml", "varchar"),
    ("longblob", "blob"),
];

/// Alignment and length by normalized type name.
///
/// `-1` marks varlena storage. The table covers every type the decoders
/// understand plus the opaque ones the walker must still step over.
const STORAGE_TABLE: &[(&str, u8, i16)] = &[
    ("float4", b'i', 4),
    ("varchar", b'i', -1),
    ("_char", b'i', -1),
    ("_bool", b'i', -1),
    ("bpchar", b'i', -1),
    ("_int", b'i', -1),
    ("timetz", b'd', 12),
    ("bytea", b'i', -1),
    ("oid", b'i', 4),
    ("xid", b'i', 4),
    ("date", b'i', 4),
    ("_varchar", b'i', -1),
    ("inet", b'i', -1),
    ("int", b'i', 4),
    ("bit", b'i', -1),
    ("numeric", b'i', -1),
    ("macaddr", b'i', 6),
    ("smallint", b's', 2),
    ("timestamp", b'd', 8),
    ("float8", b'd', 8),
    ("bigint", b'd', 8),
    ("_timestamp", b'd', -1),
    ("interval", b'd', 16),
    ("_bigint", b'd', -1),
    ("uuid", b'c', 16),
    ("_oid", b'i', -1),
    ("jsonb", b'i', -1),
    ("time", b'd', 8),
    ("bool", b'c', 1),
    ("_date", b'i', -1),
    ("char", b'c', 1),
    ("_float8", b'd', -1),
    ("name", b'c', 64),
    ("timestamptz", b'd', 8),
    ("_text", b'i', -1),
    ("_float4", b'i', -1),
    ("varbit", b'i', -1),
    ("_smallint", b'i', -1),
];

/// Normalize a type name to its storage-table key.
///
/// `bpchar` keeps its own identity (its rendering trims trailing spaces,
/// unlike `char`).
pub fn normalize_type(name: &str) -> &str {
    if name == "bpchar" {
        return "bpchar";
    }
    for (alias, std) in TYPE_ALIASES {
        if *alias == name {
            return std;
        }
    }
    name
}

/// Look up `(typalign, typlen)` for a normalized type name.
pub fn storage_for(type_name: &str) -> Option<(u8, i16)> {
    STORAGE_TABLE
        .iter()
        .find(|(n, _, _)| *n == type_name)
        .map(|(_, a, l)| (*a, *l))
}

impl TabDescriptor {
    /// Build a descriptor from bare type names, columns named `col1..colN`.
    ///
    /// This is the drop-scan path: no catalog, just a candidate type list.
    pub fn from_types(name: &str, types: &[&str]) -> Result<Self, PguError> {
        let mut attrs = Vec::with_capacity(types.len());
        for (i, raw) in types.iter().enumerate() {
            let norm = normalize_type(raw.trim());
            let (typalign, typlen) = storage_for(norm).ok_or_else(|| {
                PguError::Argument(format!("unknown column type '{}'", raw.trim()))
            })?;
            attrs.push(AttrDescriptor {
                name: format!("col{}", i + 1),
                type_name: norm.to_string(),
                typlen,
                typalign,
                typmod: -1,
                dropped: false,
            });
        }
        if attrs.is_empty() {
            return Err(PguError::Argument("empty column type list".to_string()));
        }
        Ok(TabDescriptor {
            name: name.to_string(),
            attrs,
            toast_relid: None,
        })
    }

    /// Build a descriptor from parallel catalog columns.
    ///
    /// `names` uses the literal `dropped` marker for removed columns; their
    /// recorded length and alignment still apply to the walk. Lengths and
    /// alignments may be `UNKNOWN`, in which case the storage table fills
    /// them in by type name.
    pub fn from_catalog(
        name: &str,
        names: &[String],
        types: &[String],
        typmods: &[i32],
        typlens: &[String],
        typaligns: &[String],
        toast_relid: Option<u32>,
    ) -> Result<Self, PguError> {
        if names.len() != types.len() {
            return Err(PguError::Parse(format!(
                "catalog column/type count mismatch for '{}'",
                name
            )));
        }
        let mut attrs = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            let dropped = names[i] == "dropped";
            let norm = normalize_type(types[i].as_str()).to_string();
            let from_table = storage_for(&norm);
            let typlen = typlens
                .get(i)
                .and_then(|s| s.parse::<i16>().ok())
                .or(from_table.map(|(_, l)| l))
                .ok_or_else(|| {
                    PguError::Parse(format!("no storage length for type '{}'", types[i]))
                })?;
            let typalign = typaligns
                .get(i)
                .and_then(|s| s.as_bytes().first().copied())
                .filter(|a| matches!(a, b'c' | b's' | b'i' | b'd'))
                .or(from_table.map(|(a, _)| a))
                .ok_or_else(|| {
                    PguError::Parse(format!("no alignment for type '{}'", types[i]))
                })?;
            attrs.push(AttrDescriptor {
                name: names[i].clone(),
                type_name: norm,
                typlen,
                typalign,
                typmod: typmods.get(i).copied().unwrap_or(-1),
                dropped,
            });
        }
        Ok(TabDescriptor {
            name: name.to_string(),
            attrs,
            toast_relid,
        })
    }

    /// The built-in descriptor of a TOAST relation:
    /// `(chunk_id oid, chunk_seq int, chunk_data bytea)`.
    pub fn toast() -> Self {
        TabDescriptor::from_types("pg_toast", &["oid", "int", "bytea"])
            .expect("builtin toast descriptor")
    }
}

/// One `tab.config` entry: `name type1,type2,...` per line.
pub fn parse_tab_config(path: &Path) -> Result<Vec<TabDescriptor>, PguError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PguError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, types) = line.split_once(char::is_whitespace).ok_or_else(|| {
            PguError::Parse(format!(
                "{}:{}: expected '<table> <type,type,...>'",
                path.display(),
                lineno + 1
            ))
        })?;
        let type_list: Vec<&str> = types.trim().split(',').collect();
        out.push(TabDescriptor::from_types(name, &type_list)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("int4"), "int");
        assert_eq!(normalize_type("int8"), "bigint");
        assert_eq!(normalize_type("text"), "varchar");
        assert_eq!(normalize_type("bpchar"), "bpchar");
        assert_eq!(normalize_type("uuid"), "uuid");
    }

    #[test]
    fn test_storage_lookup() {
        assert_eq!(storage_for("int"), Some((b'i', 4)));
        assert_eq!(storage_for("bigint"), Some((b'd', 8)));
        assert_eq!(storage_for("varchar"), Some((b'i', -1)));
        assert_eq!(storage_for("bool"), Some((b'c', 1)));
        assert_eq!(storage_for("uuid"), Some((b'c', 16)));
        assert_eq!(storage_for("nosuchtype"), None);
    }

    #[test]
    fn test_from_types() {
        let desc = TabDescriptor::from_types("employee", &["int", "varchar", "timestamp"]).unwrap();
        assert_eq!(desc.attrs.len(), 3);
        assert_eq!(desc.attrs[0].name, "col1");
        assert_eq!(desc.attrs[0].typlen, 4);
        assert_eq!(desc.attrs[1].typlen, -1);
        assert_eq!(desc.attrs[2].typalign, b'd');
    }

    #[test]
    fn test_from_types_rejects_unknown() {
        assert!(TabDescriptor::from_types("t", &["int", "blorp"]).is_err());
        assert!(TabDescriptor::from_types("t", &[]).is_err());
    }

    #[test]
    fn test_from_catalog_with_dropped_column() {
        let desc = TabDescriptor::from_catalog(
            "t",
            &["a".into(), "dropped".into(), "c".into()],
            &["int4".into(), "int4".into(), "text".into()],
            &[-1, -1, -1],
            &["4".into(), "4".into(), "-1".into()],
            &["i".into(), "i".into(), "i".into()],
            None,
        )
        .unwrap();
        assert!(!desc.attrs[0].dropped);
        assert!(desc.attrs[1].dropped);
        assert_eq!(desc.attrs[2].type_name, "varchar");
    }

    #[test]
    fn test_parse_tab_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "employee varchar,varchar,json").unwrap();
        writeln!(f, "department int,varchar,float4").unwrap();
        f.flush().unwrap();

        let descs = parse_tab_config(f.path()).unwrap();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].name, "employee");
        assert_eq!(descs[0].attrs.len(), 3);
        assert_eq!(descs[1].attrs[2].type_name, "float4");
    }

    #[test]
    fn test_toast_descriptor() {
        let desc = TabDescriptor::toast();
        assert_eq!(desc.attrs.len(), 3);
        assert_eq!(desc.attrs[0].typlen, 4);
        assert_eq!(desc.attrs[1].typlen, 4);
        assert_eq!(desc.attrs[2].typlen, -1);
    }
}
