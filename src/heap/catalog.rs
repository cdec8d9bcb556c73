//! Catalog text dump parsing.
//!
//! The core never reads the system catalogs from their own heap files;
//! a bootstrap pass (outside this crate's scope) dumps them to
//! tab-separated text first. This module parses those dumps:
//!
//! - `pg_database.txt` — `oid\tname\ttablespace_oid\tdb_path`
//! - `pg_schema.txt` — `oid\tname`
//! - `pg_type.txt` — `oid\tname`
//! - `tables.txt` — one fully-resolved relation per line (oid, filenode,
//!   toast oid/filenode, namespace, name, then comma-joined column names,
//!   types, count, typmods, lengths and alignments)
//!
//! It also carries the per-major-version column lists of the raw catalog
//! relations (the bootstrap pass needs them to decode `pg_class` and
//! `pg_attribute` before any metadata exists) and the `PG_VERSION` check
//! that gates everything: a cluster outside the supported range is an
//! initialisation failure, not a parse error.

use std::path::{Path, PathBuf};

use crate::heap::relation::TabDescriptor;
use crate::PguError;

/// Major versions this tool knows the catalog layouts for.
pub const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 14..=18;

/// Which raw catalog a column list describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Database,
    Schema,
    Class,
    Attribute,
    Type,
}

/// The column type list used to decode a raw catalog relation, keyed by
/// major version. Reproduced verbatim from the reference layouts; the
/// trailing `pass` marks the point past which columns are ignored.
pub fn catalog_columns(version: u32, kind: CatalogKind) -> Option<&'static str> {
    use CatalogKind::*;
    let cols = match (version, kind) {
        (18, Database) => "oid,name,oid,int,char,bool,bool,bool,int,xid,xid,oid,pass",
        (18, Class) => {
            "oid,name,oid,oid,oid,oid,oid,oid,oid,int,bool,int,int,oid,bool,bool,char,char,smallint,pass"
        }
        (18, Attribute) => "oid,name,oid,smallint,smallint,int,smallint,bool,char,pass",

        (17, Database) => "oid,name,oid,int,char,bool,bool,bool,int,xid,xid,oid,pass",
        (17, Class) => {
            "oid,name,oid,oid,oid,oid,oid,oid,oid,int,int,int,oid,bool,bool,char,char,smallint,pass"
        }
        (17, Attribute) => "oid,name,oid,smallint,smallint,int,int,smallint,bool,char,pass",

        (16, Database) => "oid,name,oid,int,char,bool,bool,int,xid,xid,oid,pass",
        (16, Class) => {
            "oid,name,oid,oid,oid,oid,oid,oid,oid,int,int,int,oid,bool,bool,char,char,smallint,pass"
        }
        (16, Attribute) => "oid,name,oid,smallint,smallint,int,int,smallint,bool,char,pass",

        (15, Database) => "oid,name,oid,int,char,bool,bool,int,xid,xid,oid,pass",
        (15, Class) => {
            "oid,name,oid,oid,oid,oid,oid,oid,oid,int,int,int,oid,bool,bool,char,char,smallint,pass"
        }
        (15, Attribute) => "oid,name,oid,int,smallint,smallint,int,int,int,bool,char,char,pass",

        (14, Database) => "oid,name,oid,int,name,name,bool,bool,int,oid,xid,xid,oid,pass",
        (14, Class) => {
            "oid,name,oid,oid,oid,oid,oid,oid,oid,int,int,int,oid,bool,bool,char,char,smallint,pass"
        }
        (14, Attribute) => "oid,name,oid,int,smallint,smallint,int,int,int,bool,char,char,pass",

        (v, Schema) if SUPPORTED_VERSIONS.contains(&v) => "oid,name,pass",
        (v, Type) if SUPPORTED_VERSIONS.contains(&v) => "oid,name,pass",
        _ => return None,
    };
    Some(cols)
}

/// Candidate descriptor for drop-scanning a system catalog itself — the
/// recovery path when even `pg_class` is gone. Columns come from the
/// version's list, truncated at the `pass` marker.
pub fn system_catalog_descriptor(
    version: u32,
    table: &str,
) -> Option<Result<TabDescriptor, PguError>> {
    let kind = match table {
        "pg_database" => CatalogKind::Database,
        "pg_namespace" => CatalogKind::Schema,
        "pg_class" => CatalogKind::Class,
        "pg_attribute" => CatalogKind::Attribute,
        "pg_type" => CatalogKind::Type,
        _ => return None,
    };
    let cols = catalog_columns(version, kind)?;
    let types: Vec<&str> = cols.split(',').take_while(|t| *t != "pass").collect();
    Some(TabDescriptor::from_types(table, &types))
}

/// Read and validate `PG_VERSION` from a data directory.
pub fn read_pg_version(datadir: &Path) -> Result<u32, PguError> {
    let path = datadir.join("PG_VERSION");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| PguError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
    let version: u32 = content
        .trim()
        .parse()
        .map_err(|_| PguError::Parse(format!("Unparsable PG_VERSION '{}'", content.trim())))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(PguError::Argument(format!(
            "Unsupported cluster version {} (supported: {}-{})",
            version,
            SUPPORTED_VERSIONS.start(),
            SUPPORTED_VERSIONS.end()
        )));
    }
    Ok(version)
}

/// One line of `pg_database.txt`.
#[derive(Debug, Clone)]
pub struct DatabaseEntry {
    pub oid: u32,
    pub name: String,
    pub tablespace_oid: u32,
    pub db_path: String,
}

/// One line of `pg_schema.txt` / `pg_type.txt`.
#[derive(Debug, Clone)]
pub struct NamedOid {
    pub oid: u32,
    pub name: String,
}

/// One fully-resolved relation from `tables.txt`.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub oid: u32,
    pub filenode: u32,
    pub toast_oid: u32,
    pub toast_filenode: u32,
    pub namespace: String,
    pub name: String,
    pub attrs: Vec<String>,
    pub types: Vec<String>,
    pub nattr: usize,
    pub attmods: Vec<String>,
    pub attlens: Vec<String>,
    pub attaligns: Vec<String>,
}

impl TableEntry {
    /// Build the walker descriptor for this relation.
    pub fn descriptor(&self) -> Result<TabDescriptor, PguError> {
        let typmods: Vec<i32> = self
            .attmods
            .iter()
            .map(|m| parse_attmod(m))
            .chain(std::iter::repeat(-1))
            .take(self.attrs.len())
            .collect();
        // UNKNOWN placeholders defer to the storage table.
        let lens = filter_unknown(&self.attlens);
        let aligns = filter_unknown(&self.attaligns);
        TabDescriptor::from_catalog(
            &self.name,
            &self.attrs,
            &self.types,
            &typmods,
            &lens,
            &aligns,
            if self.toast_filenode != 0 {
                Some(self.toast_oid)
            } else {
                None
            },
        )
    }

    /// Path of the relation's base segment under its database directory.
    pub fn heap_path(&self, db_path: &Path) -> PathBuf {
        db_path.join(self.filenode.to_string())
    }

    /// Path of the TOAST sibling's base segment, when one exists.
    pub fn toast_path(&self, db_path: &Path) -> Option<PathBuf> {
        if self.toast_filenode == 0 {
            None
        } else {
            Some(db_path.join(self.toast_filenode.to_string()))
        }
    }
}

/// A display typmod like `(10)` back to the stored form; `()` means none.
fn parse_attmod(m: &str) -> i32 {
    let inner = m.trim().trim_start_matches('(').trim_end_matches(')');
    match inner.split('.').next().and_then(|s| s.parse::<i32>().ok()) {
        Some(n) => n,
        None => -1,
    }
}

fn filter_unknown(fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|s| {
            if s == "UNKNOWN" {
                String::new()
            } else {
                s.clone()
            }
        })
        .collect()
}

/// The parsed catalog dumps of one database.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub databases: Vec<DatabaseEntry>,
    pub schemas: Vec<NamedOid>,
    pub types: Vec<NamedOid>,
    pub tables: Vec<TableEntry>,
}

impl Catalog {
    /// Load every dump file present in `dir`. Only `tables.txt` is
    /// required; the others enrich lookups when available.
    pub fn load(dir: &Path) -> Result<Self, PguError> {
        let mut catalog = Catalog {
            tables: load_tables(&dir.join("tables.txt"))?,
            ..Default::default()
        };

        if let Ok(content) = std::fs::read_to_string(dir.join("pg_database.txt")) {
            catalog.databases = parse_databases(&content)?;
        }
        if let Ok(content) = std::fs::read_to_string(dir.join("pg_schema.txt")) {
            catalog.schemas = parse_named_oids(&content)?;
        }
        if let Ok(content) = std::fs::read_to_string(dir.join("pg_type.txt")) {
            catalog.types = parse_named_oids(&content)?;
        }
        Ok(catalog)
    }

    /// Find a relation by (optionally schema-qualified) name.
    pub fn find_table(&self, name: &str) -> Option<&TableEntry> {
        match name.split_once('.') {
            Some((schema, table)) => self
                .tables
                .iter()
                .find(|t| t.namespace == schema && t.name == table),
            None => self.tables.iter().find(|t| t.name == name),
        }
    }
}

fn parse_databases(content: &str) -> Result<Vec<DatabaseEntry>, PguError> {
    let mut out = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let f: Vec<&str> = line.split('\t').collect();
        if f.len() < 4 {
            return Err(PguError::Parse(format!(
                "pg_database.txt: expected 4 fields, got {}",
                f.len()
            )));
        }
        out.push(DatabaseEntry {
            oid: f[0].parse().unwrap_or(0),
            name: f[1].to_string(),
            tablespace_oid: f[2].parse().unwrap_or(0),
            db_path: f[3].to_string(),
        });
    }
    Ok(out)
}

fn parse_named_oids(content: &str) -> Result<Vec<NamedOid>, PguError> {
    let mut out = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let f: Vec<&str> = line.split('\t').collect();
        if f.len() < 2 {
            return Err(PguError::Parse("expected 'oid\\tname' lines".to_string()));
        }
        out.push(NamedOid {
            oid: f[0].parse().unwrap_or(0),
            name: f[1].to_string(),
        });
    }
    Ok(out)
}

fn load_tables(path: &Path) -> Result<Vec<TableEntry>, PguError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PguError::Io(format!("Cannot read {}: {}", path.display(), e)))?;

    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let f: Vec<&str> = line.split('\t').collect();
        if f.len() < 12 {
            return Err(PguError::Parse(format!(
                "{}:{}: expected 12 tab-separated fields, got {}",
                path.display(),
                lineno + 1,
                f.len()
            )));
        }
        let split = |s: &str| -> Vec<String> {
            if s.is_empty() {
                Vec::new()
            } else {
                s.split(',').map(|t| t.trim().to_string()).collect()
            }
        };
        let entry = TableEntry {
            oid: f[0].parse().unwrap_or(0),
            filenode: f[1].parse().unwrap_or(0),
            toast_oid: f[2].parse().unwrap_or(0),
            toast_filenode: f[3].parse().unwrap_or(0),
            namespace: f[4].to_string(),
            name: f[5].to_string(),
            attrs: split(f[6]),
            types: split(f[7]),
            nattr: f[8].parse().unwrap_or(0),
            attmods: split(f[9]),
            attlens: if f[10] == "UNKNOWN" {
                vec!["UNKNOWN".to_string(); split(f[6]).len()]
            } else {
                split(f[10])
            },
            attaligns: if f[11] == "UNKNOWN" {
                vec!["UNKNOWN".to_string(); split(f[6]).len()]
            } else {
                split(f[11])
            },
        };
        out.push(entry);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_version_column_tables_cover_all_versions() {
        for v in SUPPORTED_VERSIONS {
            for kind in [
                CatalogKind::Database,
                CatalogKind::Schema,
                CatalogKind::Class,
                CatalogKind::Attribute,
                CatalogKind::Type,
            ] {
                let cols = catalog_columns(v, kind).expect("column list");
                assert!(cols.ends_with("pass"));
            }
        }
        assert!(catalog_columns(13, CatalogKind::Class).is_none());
    }

    #[test]
    fn test_attribute_widths_differ_between_15_and_16() {
        // pg_attribute lost a column between 15 and 16; the tables must
        // not be collapsed.
        let v15 = catalog_columns(15, CatalogKind::Attribute).unwrap();
        let v16 = catalog_columns(16, CatalogKind::Attribute).unwrap();
        assert_ne!(v15, v16);
        assert_eq!(v15.split(',').count(), 13);
        assert_eq!(v16.split(',').count(), 11);
    }

    #[test]
    fn test_database_dump_widths_differ_for_14() {
        let v14 = catalog_columns(14, CatalogKind::Database).unwrap();
        let v15 = catalog_columns(15, CatalogKind::Database).unwrap();
        assert!(v14.split(',').count() > v15.split(',').count());
    }

    #[test]
    fn test_system_catalog_descriptor() {
        let desc = system_catalog_descriptor(16, "pg_class").unwrap().unwrap();
        assert_eq!(desc.attrs.len(), 18); // the 19-token list minus `pass`
        assert_eq!(desc.attrs[0].type_name, "oid");
        assert_eq!(desc.attrs[1].type_name, "name");
        assert_eq!(desc.attrs[1].typlen, 64);

        let attr15 = system_catalog_descriptor(15, "pg_attribute").unwrap().unwrap();
        let attr16 = system_catalog_descriptor(16, "pg_attribute").unwrap().unwrap();
        assert_ne!(attr15.attrs.len(), attr16.attrs.len());

        assert!(system_catalog_descriptor(16, "employee").is_none());
        assert!(system_catalog_descriptor(13, "pg_class").is_none());
    }

    #[test]
    fn test_read_pg_version() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("PG_VERSION"), "16\n").unwrap();
        assert_eq!(read_pg_version(dir.path()).unwrap(), 16);

        fs::write(dir.path().join("PG_VERSION"), "11\n").unwrap();
        assert!(read_pg_version(dir.path()).is_err());

        fs::write(dir.path().join("PG_VERSION"), "junk").unwrap();
        assert!(read_pg_version(dir.path()).is_err());
    }

    #[test]
    fn test_load_tables_and_descriptor() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tables.txt"),
            "16385\t24576\t16388\t24579\tpublic\temployee\tid,name,hired\tint4,varchar,timestamp\t3\t(),(40),()\tUNKNOWN\tUNKNOWN\n",
        )
        .unwrap();
        fs::write(dir.path().join("pg_schema.txt"), "2200\tpublic\n").unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.tables.len(), 1);
        assert_eq!(catalog.schemas.len(), 1);

        let entry = catalog.find_table("employee").unwrap();
        assert_eq!(entry.filenode, 24576);
        assert_eq!(entry.toast_filenode, 24579);

        let desc = entry.descriptor().unwrap();
        assert_eq!(desc.attrs.len(), 3);
        assert_eq!(desc.attrs[0].type_name, "int");
        assert_eq!(desc.attrs[1].type_name, "varchar");
        assert_eq!(desc.attrs[1].typmod, 40);
        assert_eq!(desc.attrs[2].typalign, b'd');

        assert!(catalog.find_table("public.employee").is_some());
        assert!(catalog.find_table("other.employee").is_none());

        let db_path = Path::new("base/5");
        assert_eq!(entry.heap_path(db_path), Path::new("base/5/24576"));
        assert_eq!(
            entry.toast_path(db_path).unwrap(),
            Path::new("base/5/24579")
        );
    }
}
