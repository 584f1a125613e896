pub mod audit;
pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod stop_times;

pub use config::FetchConfig;
pub use error::{CrtmError, Result};
pub use parser::{ARRIVAL_CSV_COLUMNS, ArrivalRow, parse_stop_times};
pub use stop_times::{
    StopResponse, StopTimesFetcher, get_stop_times, get_stop_times_batch,
    get_stop_times_batch_parsed,
};
