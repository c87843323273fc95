use crate::{
    CubePIRError,
    pir_internals::{
        answer::{self, AnswerConfig, AnswerSet},
        branch_opt_util,
        database::Database,
        geometry::Geometry,
        query::Query,
    },
};

/// Represents one replica server in the multi-server, information-theoretic PIR scheme.
///
/// The server borrows a read-only database buffer for its whole lifetime. Answering never mutates anything, so a single `Server`
/// can be shared across threads and answer any number of queries concurrently.
#[derive(Clone, Copy, Debug)]
pub struct Server<'a> {
    db: Database<'a>,
    config: AnswerConfig,
}

impl<'a> Server<'a> {
    /// Sets up a PIR server over a caller provisioned database buffer, using default answer configuration.
    ///
    /// # Arguments
    ///
    /// * `db_bytes`: Database buffer, holding `db_bytes.len() / (blocks_per_entry * 32)` entries in row-major cube order.
    /// * `blocks_per_entry`: Number of 32 -bytes blocks in each entry.
    /// * `dimensions`: Number of cube axes, either 2 or 3. Selector vectors, and hence queries, have length `ceil(N^(1/dimensions))`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Server`, or an error if the geometry is invalid.
    pub fn setup(db_bytes: &'a [u8], blocks_per_entry: usize, dimensions: usize) -> Result<Server<'a>, CubePIRError> {
        Server::setup_with_config(db_bytes, blocks_per_entry, dimensions, AnswerConfig::default())
    }

    /// Same as [`Server::setup`], with explicit prefetch distance and XOR backend. Fails with `BackendUnavailable` if the
    /// requested backend can't run on this CPU.
    pub fn setup_with_config(db_bytes: &'a [u8], blocks_per_entry: usize, dimensions: usize, config: AnswerConfig) -> Result<Server<'a>, CubePIRError> {
        if branch_opt_util::unlikely(!config.backend.is_available()) {
            return Err(CubePIRError::BackendUnavailable);
        }

        let db = Database::new(db_bytes, blocks_per_entry, dimensions)?;

        tracing::debug!(
            num_entries = db.geometry().num_entries(),
            blocks_per_entry,
            dimensions,
            axis_len = db.geometry().axis_len(),
            prefetch_distance = config.prefetch_distance,
            backend = ?config.backend,
            "PIR server set up"
        );

        Ok(Server { db, config })
    }

    /// Geometry clients must agree on to talk to this server.
    #[inline(always)]
    pub const fn geometry(&self) -> &Geometry {
        self.db.geometry()
    }
    #[inline(always)]
    pub const fn database(&self) -> &Database<'a> {
        &self.db
    }

    /// Answers a client query.
    pub fn answer(&self, query: &Query) -> Result<AnswerSet, CubePIRError> {
        answer::answer(&self.db, query, &self.config)
    }

    /// Responds to a serialized client query with a serialized answer.
    ///
    /// # Arguments
    ///
    /// * `query`: The client's query, as produced by `Query::to_bytes`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the answer bytes, or an error if the query can't be parsed for this server's geometry.
    pub fn respond(&self, query: &[u8]) -> Result<Vec<u8>, CubePIRError> {
        let geometry = self.geometry();
        let query = Query::from_bytes(query, geometry.axis_len(), geometry.dimensions())?;

        Ok(self.answer(&query)?.to_bytes())
    }
}
