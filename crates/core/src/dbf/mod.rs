//! DBF access layer - normalized values, table codec, and the read/write service.

mod codec;
mod paths;
mod service;
mod value;

pub use codec::{DbfTable, RawRecord, RecordIter};
pub use paths::{
    find_company_master, find_datafiles_root, find_log_dir, load_saved_root, resolve_company_dir,
    save_root,
};
pub use service::{DbfPage, DbfRow, DbfService, DbfStream, ReadOptions, SortDir};
pub use value::{
    encode_field, normalize_field, normalize_text, parse_amount, parse_date, parse_logical,
    CellValue, FieldDescriptor, FieldKind,
};
