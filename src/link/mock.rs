use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use super::LinkPort;

#[derive(Default)]
struct Shared{
    inbound: Mutex<VecDeque<u8>>,
    outbound: Mutex<Vec<u8>>,
    //(frame written, line queued in reply)
    replies: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    drops: AtomicUsize,
}

//in-memory port; the handle stays with the test after the port moves into a Link
pub struct MockPort{
    shared: Arc<Shared>,
}

#[derive(Clone)]
pub struct MockHandle{
    shared: Arc<Shared>,
}

impl MockPort{
    pub fn new() -> (Self, MockHandle){
        let shared = Arc::new(Shared::default());
        (MockPort{ shared: Arc::clone(&shared) }, MockHandle{ shared })
    }
}

impl MockHandle{
    pub fn feed(&self, bytes: &[u8]){
        self.shared.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn feed_line(&self, line: &str){
        self.feed(line.as_bytes());
        self.feed(b"\n");
    }

    /// Queues `reply` on the inbound side whenever `command` is written.
    pub fn respond(&self, command: &str, reply: &str){
        let frame = format!("{}\n", command).into_bytes();
        let line = format!("{}\n", reply).into_bytes();
        self.shared.replies.lock().unwrap().push((frame, line));
    }

    pub fn written(&self) -> Vec<u8>{
        self.shared.outbound.lock().unwrap().clone()
    }

    pub fn written_text(&self) -> String{
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    pub fn drops(&self) -> usize{
        self.shared.drops.load(Ordering::SeqCst)
    }
}

impl Read for MockPort{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>{
        let mut inbound = self.shared.inbound.lock().unwrap();
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)){
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>{
        self.shared.outbound.lock().unwrap().extend_from_slice(buf);
        let replies = self.shared.replies.lock().unwrap();
        for (_, line) in replies.iter().filter(|(frame, _)| frame.as_slice() == buf){
            self.shared.inbound.lock().unwrap().extend(line.iter().copied());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>{
        Ok(())
    }
}

impl LinkPort for MockPort{
    fn bytes_pending(&mut self) -> io::Result<u32>{
        Ok(self.shared.inbound.lock().unwrap().len() as u32)
    }
}

impl Drop for MockPort{
    fn drop(&mut self){
        self.shared.drops.fetch_add(1, Ordering::SeqCst);
    }
}
