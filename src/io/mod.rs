mod export;
mod import;
mod table;

pub mod columns {
    pub const NAME: &str = "Company Name";
    pub const SPEND: &str = "Customer Value";
    pub const USAGE: &str = "Used";
    pub const GROWTH_RATE: &str = "Growth Rate";
    pub const GROWTH_AMOUNT: &str = "Growth Amount";
    pub const NEW_TOTAL: &str = "New Total";
    pub const CANCELLED: &str = "Cancelled";

    pub const EXPORT_HEADER: [&str; 7] = [
        NAME,
        SPEND,
        USAGE,
        GROWTH_RATE,
        GROWTH_AMOUNT,
        NEW_TOTAL,
        CANCELLED,
    ];
}

pub use export::{export_to_path, export_to_string, write_records};
pub use import::{read_records, read_records_from_path};
pub use table::{render_notices, render_records, render_shares, render_summary};
