//! Trace export as CBOR.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use gridlock_core::Trace;

use crate::error::RunError;

/// Encode `trace` as CBOR into `writer`.
pub fn write_trace_cbor<W: Write>(trace: &Trace, writer: W) -> Result<(), RunError> {
    ciborium::into_writer(trace, writer).map_err(|e| match e {
        ciborium::ser::Error::Io(io) => RunError::Io(io),
        ciborium::ser::Error::Value(msg) => RunError::Encode(msg),
    })
}

/// Write `trace` to a CBOR file at `path`, replacing it if it exists.
pub fn export_trace(trace: &Trace, path: &Path) -> Result<(), RunError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_trace_cbor(trace, &mut writer)?;
    writer.flush()?;
    tracing::info!("trace written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use gridlock_core::{Pid, TraceEvent};

    use super::*;

    #[test]
    fn trace_encodes_as_cbor_map() {
        let mut trace = Trace::new();
        trace.push(TraceEvent::Halted);
        trace.push(TraceEvent::Completed { pid: Pid(0), released: [1, 0].into() });

        let mut buf = Vec::new();
        write_trace_cbor(&trace, &mut buf).unwrap();

        let value: ciborium::Value = ciborium::from_reader(buf.as_slice()).unwrap();
        let entries = value
            .as_map()
            .and_then(|map| map.iter().find(|(key, _)| key.as_text() == Some("entries")))
            .and_then(|(_, entries)| entries.as_array())
            .unwrap();
        assert_eq!(entries.len(), 2);
    }
}
