pub mod bar;
pub mod raw_table;
pub mod request_params;
pub mod timeframe;
