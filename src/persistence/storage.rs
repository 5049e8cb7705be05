//! RocksDB storage layer for the layout store
//!
//! One column family per table, bincode-encoded values. Pipeline outputs are
//! written with replace-all semantics inside a single `WriteBatch`, so a
//! reader never observes a half-written stage.

use crate::model::{
    ClusterId, CommunityAssignment, CommunityId, MovementEvent, Product, ProductCluster,
    ProductId, Recommendation, RunRecord, Section, SectionId, TransitionEdge,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const CF_SECTIONS: &str = "sections";
const CF_PRODUCTS: &str = "products";
const CF_MOVEMENTS: &str = "movements";
const CF_EDGES: &str = "edges";
const CF_COMMUNITIES: &str = "communities";
const CF_CLUSTERS: &str = "clusters";
const CF_RECOMMENDATIONS: &str = "recommendations";
const CF_RUNS: &str = "runs";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_SECTIONS,
    CF_PRODUCTS,
    CF_MOVEMENTS,
    CF_EDGES,
    CF_COMMUNITIES,
    CF_CLUSTERS,
    CF_RECOMMENDATIONS,
    CF_RUNS,
];

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Column family error
    #[error("Column family error: {0}")]
    ColumnFamily(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Row counts across every table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub sections: usize,
    pub products: usize,
    pub movements: usize,
    pub edges: usize,
    pub communities: usize,
    pub clusters: usize,
    pub recommendations: usize,
    pub runs: usize,
}

/// RocksDB-backed layout store
pub struct LayoutStorage {
    db: DB,
    path: PathBuf,
}

impl LayoutStorage {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        info!("Opening layout storage at: {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        opts.set_write_buffer_size(16 * 1024 * 1024); // 16 MB
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let mut cf_descriptors = vec![ColumnFamilyDescriptor::new("default", Options::default())];
        cf_descriptors.extend(
            COLUMN_FAMILIES
                .iter()
                .map(|name| ColumnFamilyDescriptor::new(*name, Self::table_cf_options())),
        );

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        info!("Layout storage opened successfully");

        Ok(Self { db, path })
    }

    fn table_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// Directory the database lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> StorageResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamily(name.to_string()))
    }

    // ---- inputs ----

    /// Upsert sections into the catalog
    pub fn put_sections(&self, sections: &[Section]) -> StorageResult<()> {
        let cf = self.cf(CF_SECTIONS)?;
        let mut batch = WriteBatch::default();
        for section in sections {
            batch.put_cf(cf, Self::section_key(&section.id), bincode::serialize(section)?);
        }
        self.db.write(batch)?;
        debug!("Stored {} sections", sections.len());
        Ok(())
    }

    /// Upsert products into the catalog
    pub fn put_products(&self, products: &[Product]) -> StorageResult<()> {
        let cf = self.cf(CF_PRODUCTS)?;
        let mut batch = WriteBatch::default();
        for product in products {
            batch.put_cf(cf, Self::product_key(product.id), bincode::serialize(product)?);
        }
        self.db.write(batch)?;
        debug!("Stored {} products", products.len());
        Ok(())
    }

    /// Append movement events; an event with an existing (session, step) overwrites it
    pub fn put_movements(&self, events: &[MovementEvent]) -> StorageResult<()> {
        let cf = self.cf(CF_MOVEMENTS)?;
        let mut batch = WriteBatch::default();
        for event in events {
            batch.put_cf(
                cf,
                Self::movement_key(&event.session_id, event.step_order),
                bincode::serialize(event)?,
            );
        }
        self.db.write(batch)?;
        debug!("Stored {} movement events", events.len());
        Ok(())
    }

    /// Remove all inputs and the outputs derived from them. Run history is kept.
    pub fn clear_inputs(&self) -> StorageResult<()> {
        let mut batch = WriteBatch::default();
        for name in [
            CF_SECTIONS,
            CF_PRODUCTS,
            CF_MOVEMENTS,
            CF_EDGES,
            CF_COMMUNITIES,
            CF_CLUSTERS,
            CF_RECOMMENDATIONS,
        ] {
            self.delete_all(&mut batch, name)?;
        }
        self.db.write(batch)?;
        info!("Cleared store inputs and derived tables");
        Ok(())
    }

    // ---- scans ----

    /// Sections ordered by id
    pub fn scan_sections(&self) -> StorageResult<Vec<Section>> {
        self.scan(CF_SECTIONS)
    }

    /// Products ordered by id
    pub fn scan_products(&self) -> StorageResult<Vec<Product>> {
        self.scan(CF_PRODUCTS)
    }

    /// Movement events ordered by (session, step)
    pub fn scan_movements(&self) -> StorageResult<Vec<MovementEvent>> {
        self.scan(CF_MOVEMENTS)
    }

    /// Edges ordered by (source, target)
    pub fn scan_edges(&self) -> StorageResult<Vec<TransitionEdge>> {
        self.scan(CF_EDGES)
    }

    pub fn scan_communities(&self) -> StorageResult<Vec<CommunityAssignment>> {
        self.scan(CF_COMMUNITIES)
    }

    pub fn scan_clusters(&self) -> StorageResult<Vec<ProductCluster>> {
        self.scan(CF_CLUSTERS)
    }

    /// Recommendations ordered by product id
    pub fn scan_recommendations(&self) -> StorageResult<Vec<Recommendation>> {
        self.scan(CF_RECOMMENDATIONS)
    }

    /// Run history, oldest first
    pub fn scan_runs(&self) -> StorageResult<Vec<RunRecord>> {
        self.scan(CF_RUNS)
    }

    pub fn get_product(&self, id: ProductId) -> StorageResult<Option<Product>> {
        let cf = self.cf(CF_PRODUCTS)?;
        match self.db.get_cf(cf, Self::product_key(id))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // ---- pipeline outputs ----

    /// Replace the whole edge set
    pub fn replace_edges(&self, edges: &[TransitionEdge]) -> StorageResult<()> {
        let rows = edges
            .iter()
            .map(|e| (Self::edge_key(&e.source, &e.target), e));
        self.replace(CF_EDGES, rows)?;
        debug!("Replaced edge set with {} edges", edges.len());
        Ok(())
    }

    pub fn replace_communities(&self, assignments: &[CommunityAssignment]) -> StorageResult<()> {
        let rows = assignments
            .iter()
            .map(|a| (Self::section_key(&a.section), a));
        self.replace(CF_COMMUNITIES, rows)?;
        debug!("Replaced {} community assignments", assignments.len());
        Ok(())
    }

    pub fn replace_clusters(&self, clusters: &[ProductCluster]) -> StorageResult<()> {
        let rows = clusters.iter().map(|c| (Self::product_key(c.product), c));
        self.replace(CF_CLUSTERS, rows)?;
        debug!("Replaced {} product clusters", clusters.len());
        Ok(())
    }

    pub fn replace_recommendations(&self, recommendations: &[Recommendation]) -> StorageResult<()> {
        let rows = recommendations
            .iter()
            .map(|r| (Self::product_key(r.product), r));
        self.replace(CF_RECOMMENDATIONS, rows)?;
        debug!("Replaced {} recommendations", recommendations.len());
        Ok(())
    }

    /// Append a run record with the next monotonic id
    pub fn append_run(&self, created_at: i64, notes: impl Into<String>) -> StorageResult<RunRecord> {
        let cf = self.cf(CF_RUNS)?;
        let run_id = self.latest_run()?.map_or(1, |run| run.run_id + 1);
        let record = RunRecord {
            run_id,
            created_at,
            notes: notes.into(),
        };
        self.db
            .put_cf(cf, run_id.to_be_bytes(), bincode::serialize(&record)?)?;
        info!("Recorded pipeline run {}", run_id);
        Ok(record)
    }

    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let cf = self.cf(CF_RUNS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (_key, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    // ---- derived reads ----

    /// Sections grouped by community, each group sorted by section id
    pub fn communities_by_id(&self) -> StorageResult<BTreeMap<CommunityId, Vec<SectionId>>> {
        let mut groups: BTreeMap<CommunityId, Vec<SectionId>> = BTreeMap::new();
        // Keys are section ids, so each group is already sorted
        for assignment in self.scan_communities()? {
            groups
                .entry(assignment.community)
                .or_default()
                .push(assignment.section);
        }
        Ok(groups)
    }

    pub fn summary(&self) -> StorageResult<StoreSummary> {
        let communities: BTreeSet<CommunityId> = self
            .scan_communities()?
            .into_iter()
            .map(|a| a.community)
            .collect();
        let clusters: BTreeSet<ClusterId> = self
            .scan_clusters()?
            .into_iter()
            .map(|c| c.cluster)
            .collect();

        Ok(StoreSummary {
            sections: self.count(CF_SECTIONS)?,
            products: self.count(CF_PRODUCTS)?,
            movements: self.count(CF_MOVEMENTS)?,
            edges: self.count(CF_EDGES)?,
            communities: communities.len(),
            clusters: clusters.len(),
            recommendations: self.count(CF_RECOMMENDATIONS)?,
            runs: self.count(CF_RUNS)?,
        })
    }

    /// Move every recommended product into its recommended section.
    ///
    /// Returns the number of products whose current section changed.
    pub fn apply_recommendations(&self) -> StorageResult<usize> {
        let cf = self.cf(CF_PRODUCTS)?;
        let mut batch = WriteBatch::default();
        let mut moved = 0;

        for rec in self.scan_recommendations()? {
            let mut product = self
                .get_product(rec.product)?
                .ok_or_else(|| StorageError::NotFound(format!("product {}", rec.product)))?;
            if product.current_section.as_ref() == Some(&rec.section) {
                continue;
            }
            product.current_section = Some(rec.section);
            batch.put_cf(cf, Self::product_key(product.id), bincode::serialize(&product)?);
            moved += 1;
        }

        self.db.write(batch)?;
        info!("Applied recommendations: {} products moved", moved);
        Ok(moved)
    }

    /// Flush all data to disk
    pub fn flush(&self) -> StorageResult<()> {
        for name in COLUMN_FAMILIES {
            self.db.flush_cf(self.cf(name)?)?;
        }
        debug!("Flushed storage to disk");
        Ok(())
    }

    // ---- helpers ----

    fn scan<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    fn count(&self, name: &str) -> StorageResult<usize> {
        let cf = self.cf(name)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn delete_all(&self, batch: &mut WriteBatch, name: &str) -> StorageResult<()> {
        let cf = self.cf(name)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(cf, key);
        }
        Ok(())
    }

    fn replace<'a, K, T, I>(&self, name: &str, rows: I) -> StorageResult<()>
    where
        K: AsRef<[u8]>,
        T: Serialize + 'a,
        I: Iterator<Item = (K, &'a T)>,
    {
        let cf = self.cf(name)?;
        let mut batch = WriteBatch::default();
        self.delete_all(&mut batch, name)?;
        for (key, row) in rows {
            batch.put_cf(cf, key, bincode::serialize(row)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn section_key(id: &SectionId) -> Vec<u8> {
        id.as_str().as_bytes().to_vec()
    }

    fn product_key(id: ProductId) -> [u8; 8] {
        id.as_u64().to_be_bytes()
    }

    /// session bytes, NUL, big-endian step
    fn movement_key(session_id: &str, step: u32) -> Vec<u8> {
        let mut key = Vec::with_capacity(session_id.len() + 5);
        key.extend_from_slice(session_id.as_bytes());
        key.push(0);
        key.extend_from_slice(&step.to_be_bytes());
        key
    }

    fn edge_key(source: &SectionId, target: &SectionId) -> Vec<u8> {
        let mut key = Vec::with_capacity(source.as_str().len() + target.as_str().len() + 1);
        key.extend_from_slice(source.as_str().as_bytes());
        key.push(0);
        key.extend_from_slice(target.as_str().as_bytes());
        key
    }
}
