use crate::{
    CubePIRError,
    pir_internals::{
        answer::AnswerSet,
        block::Entry,
        branch_opt_util,
        geometry::{Coordinate, Geometry},
        query::Query,
        reconstruct,
    },
};

/// The two queries a client sends, to two non-colluding servers, to fetch the entry at `coordinate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPair {
    coordinate: Coordinate,
    base: Query,
    probe: Query,
}

impl QueryPair {
    #[inline(always)]
    pub const fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
    /// Query for the first server.
    #[inline(always)]
    pub const fn base(&self) -> &Query {
        &self.base
    }
    /// Query for the second server, the base query with one selector bit per axis flipped.
    #[inline(always)]
    pub const fn probe(&self) -> &Query {
        &self.probe
    }
}

/// Represents the client in the multi-server, information-theoretic PIR scheme.
///
/// The client only needs to know the database geometry it shares with the servers. It keeps no per-query state, everything
/// needed to reconstruct an entry travels in the [`QueryPair`].
#[derive(Clone, Copy, Debug)]
pub struct Client {
    geometry: Geometry,
}

impl Client {
    pub fn setup(geometry: Geometry) -> Client {
        Client { geometry }
    }

    #[inline(always)]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Prepares a query pair for the database entry at `linear_index`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the query pair, `CoordinateOutOfRange` if the index lies outside the cube, or `GeometryOverflow`
    /// if it lies inside the cube but past the last provisioned entry.
    pub fn query(&self, linear_index: usize) -> Result<QueryPair, CubePIRError> {
        let coordinate = self.geometry.coordinate(linear_index)?;
        self.query_coordinate(coordinate)
    }

    /// Prepares a query pair for the database entry at `coordinate`. Same error cases as [`Client::query`].
    pub fn query_coordinate(&self, coordinate: Coordinate) -> Result<QueryPair, CubePIRError> {
        self.geometry.linear_index(&coordinate)?;
        if branch_opt_util::unlikely(!self.geometry.is_reachable(&coordinate)) {
            return Err(CubePIRError::GeometryOverflow);
        }

        let base = Query::generate(self.geometry.axis_len(), self.geometry.dimensions())?;
        let probe = base.probe(&coordinate)?;

        tracing::debug!(
            axis_len = self.geometry.axis_len(),
            dimensions = self.geometry.dimensions(),
            query_byte_len = Query::byte_len(self.geometry.axis_len(), self.geometry.dimensions()),
            "prepared PIR query pair"
        );

        Ok(QueryPair { coordinate, base, probe })
    }

    /// Recovers the queried entry from the answers of the two servers.
    pub fn reconstruct(&self, queries: &QueryPair, base_answer: &AnswerSet, probe_answer: &AnswerSet) -> Result<Entry, CubePIRError> {
        if branch_opt_util::unlikely(base_answer.geometry() != &self.geometry || probe_answer.geometry() != &self.geometry) {
            return Err(CubePIRError::AnswerGeometryMismatch);
        }

        reconstruct::reconstruct(&queries.coordinate, base_answer, probe_answer)
    }

    /// Recovers the queried entry's bytes from the serialized answers of the two servers.
    pub fn process_responses(&self, queries: &QueryPair, base_response: &[u8], probe_response: &[u8]) -> Result<Vec<u8>, CubePIRError> {
        let base_answer = AnswerSet::from_bytes(base_response, &self.geometry)?;
        let probe_answer = AnswerSet::from_bytes(probe_response, &self.geometry)?;

        Ok(self.reconstruct(queries, &base_answer, &probe_answer)?.into_bytes())
    }
}
