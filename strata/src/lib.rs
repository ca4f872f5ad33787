pub use strata_table::*;
pub use {
    strata_chunk as chunk, strata_dtype as dtype, strata_error as error,
    strata_scalar as scalar, strata_table as table,
};
