//! End-to-end memsink round trip against a real `/dev/shm` object: writes
//! a header + H.264 access unit the way the video source process would,
//! then drives `MemSinkReader` through attach / wait_frame / get_frame.

use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use ustreamer_dataplane::frame::{Frame, FOURCC_H264};
use ustreamer_dataplane::memsink::shared::{Header, HEADER_SIZE, MEMSINK_MAGIC, MEMSINK_VERSION};
use ustreamer_dataplane::memsink::MemSinkReader;

struct ShmGuard {
    path: String,
}

impl Drop for ShmGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn write_header_and_data(path: &str, header: &Header, data: &[u8]) {
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path).unwrap();
    let header_bytes =
        unsafe { std::slice::from_raw_parts((header as *const Header) as *const u8, HEADER_SIZE) };
    file.write_all(header_bytes).unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
}

fn base_header(id: u64, used: usize) -> Header {
    Header {
        magic: MEMSINK_MAGIC,
        version: MEMSINK_VERSION,
        id,
        used: used as u64,
        width: 1920,
        height: 1080,
        format: FOURCC_H264,
        stride: 0,
        online: 1,
        key: 1,
        _pad: [0, 0],
        gop: 30,
        grab_ts: 1.0,
        encode_begin_ts: 1.1,
        encode_end_ts: 1.2,
        last_client_ts: 0.0,
        key_requested: 0,
        _pad_tail: [0; 7],
    }
}

#[test]
fn wait_frame_then_get_frame_round_trips_the_access_unit() {
    let name = format!("ustreamer-dataplane-test-{}::h264", std::process::id());
    let path = format!("/dev/shm/{name}");
    let guard = ShmGuard { path: path.clone() };

    let payload = vec![0x65u8; 256];
    let header = base_header(1, payload.len());
    write_header_and_data(&path, &header, &payload);

    let mut reader = MemSinkReader::new(name.as_str()).unwrap();
    reader.attach().unwrap();
    reader.wait_frame_with(Duration::from_millis(200), Duration::from_millis(2)).unwrap();

    let mut frame = Frame::new();
    let id = reader.get_frame(&mut frame, false).unwrap();

    assert_eq!(id, 1);
    assert_eq!(frame.data, payload);
    assert_eq!(frame.width, 1920);
    assert_eq!(frame.height, 1080);
    assert!(frame.key);

    drop(guard);
}

#[test]
fn wait_frame_times_out_when_id_does_not_change() {
    let name = format!("ustreamer-dataplane-test-{}-stale::h264", std::process::id());
    let path = format!("/dev/shm/{name}");
    let guard = ShmGuard { path: path.clone() };

    let payload = vec![0x41u8; 32];
    let header = base_header(1, payload.len());
    write_header_and_data(&path, &header, &payload);

    let mut reader = MemSinkReader::new(name.as_str()).unwrap();
    reader.attach().unwrap();
    reader.wait_frame_with(Duration::from_millis(100), Duration::from_millis(2)).unwrap();
    let mut frame = Frame::new();
    reader.get_frame(&mut frame, false).unwrap();

    // Same id as before: a second wait must time out rather than fire again.
    let result = reader.wait_frame_with(Duration::from_millis(100), Duration::from_millis(2));
    assert!(result.is_err());

    drop(guard);
}
