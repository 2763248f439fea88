mod assembler;


pub use assembler::{
    compose, render_pdf, DetailPage, ReportDocument, SummaryLine, TableRow, TitleSection,
    TABLE_ROW_CAP,
};
