//! Diagnostics emitted while scanning.

use dbkit::{ColumnMeta, Record, ResultSet, Session, Value};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Debug, Default, Record)]
struct IdOnly {
    id: i64,
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_discarded_columns_are_logged() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let rows = ResultSet::new([
        ColumnMeta::new("id", "int8"),
        ColumnMeta::new("email", "text"),
    ])
    .with_row(vec![Value::Int(1), Value::Text("a@x.io".into())])
    .unwrap();

    let ids: Vec<IdOnly> = tracing::subscriber::with_default(subscriber, || {
        Session::new().scan_all(&mut rows.cursor()).unwrap()
    });
    assert_eq!(ids[0].id, 1);

    let logs = captured.text();
    assert!(logs.contains("dbkit.scan"), "{logs}");
    assert!(logs.contains("columns without a field are discarded"), "{logs}");
    assert!(logs.contains("discarded=[\"email\"]"), "{logs}");
}
