//! Network-attached pupil sensor client.
//!
//! The sensor streams newline-delimited JSON frames over TCP. This
//! client is deliberately thin: connect, read one frame per call,
//! close. Connection retry policy lives in the scheduler, not here.

use crate::source::types::{DeviceFrame, PupilSample};
use crate::source::{SampleSource, SourceError};
use std::io::{BufRead, BufReader};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocking client for the pupil sensor's JSON-lines stream.
#[derive(Debug)]
pub struct DeviceSource {
    reader: BufReader<TcpStream>,
    line: String,
}

impl DeviceSource {
    /// Connect to the sensor at `address` (`host:port`).
    pub fn connect(address: &str) -> Result<Self, SourceError> {
        let connect_err = |message: String| SourceError::Connect {
            address: address.to_string(),
            message,
        };

        let mut addrs = address
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?;
        let addr = addrs
            .next()
            .ok_or_else(|| connect_err("address resolved to nothing".to_string()))?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| connect_err(e.to_string()))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| connect_err(e.to_string()))?;

        Ok(Self {
            reader: BufReader::new(stream),
            line: String::new(),
        })
    }
}

impl SampleSource for DeviceSource {
    fn receive_sample(&mut self) -> Result<PupilSample, SourceError> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line)?;
        if n == 0 {
            return Err(SourceError::Disconnected);
        }
        let frame: DeviceFrame = serde_json::from_str(self.line.trim_end())?;
        Ok(frame.into_sample())
    }

    fn close(&mut self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_connect_refused_maps_to_connect_error() {
        // Port 1 is essentially never listening locally.
        let err = DeviceSource::connect("127.0.0.1:1").unwrap_err();
        assert!(matches!(err, SourceError::Connect { .. }));
    }

    #[test]
    fn test_reads_json_lines_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            writeln!(
                stream,
                r#"{{"timestamp_unix_seconds": 12.5, "pupil_diameter_left": 4.0, "pupil_diameter_right": 5.0, "gaze_x": 0.5, "gaze_y": 0.5, "worn": true}}"#
            )
            .unwrap();
            // Second line malformed, then EOF.
            writeln!(stream, "not json").unwrap();
        });

        let mut source = DeviceSource::connect(&addr.to_string()).unwrap();

        let sample = source.receive_sample().unwrap();
        assert_eq!(sample.timestamp, 12.5);
        assert_eq!(sample.pupil_diameter, Some(4.5));

        assert!(matches!(
            source.receive_sample().unwrap_err(),
            SourceError::Malformed(_)
        ));

        server.join().unwrap();
        let end = source.receive_sample().unwrap_err();
        assert!(matches!(
            end,
            SourceError::Disconnected | SourceError::Io(_)
        ));
        source.close();
    }
}
