//! In-process FTP server double for the integration tests.
//!
//! [`MockServer`] serves one in-memory filesystem over 127.0.0.1 with PASV
//! data connections, MLSD listings and explicit FTPS (AUTH TLS / PBSZ / PROT).
//! [`ScriptedServer`] plays a fixed list of [`Step`]s on a single connection
//! for the failure paths a well-behaved server never takes.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub const USER: &str = "alice";
pub const PASSWORD: &str = "s3cret";

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Filesystem and observations shared by every connection.
#[derive(Default)]
pub struct ServerState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    /// One entry per accepted data connection: was it TLS-wrapped?
    pub data_tls: Vec<bool>,
    /// Every command received, in order, `PASS` arguments included.
    pub commands: Vec<String>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut fs = ServerState::default();
        fs.dirs.insert("/".into());
        let state = Arc::new(Mutex::new(fs));
        let acceptor = tls_acceptor();

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let state = shared.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = serve(tcp, state, acceptor).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn add_dir(&self, path: &str) {
        self.state.lock().unwrap().dirs.insert(path.to_string());
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn data_tls(&self) -> Vec<bool> {
        self.state.lock().unwrap().data_tls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// `/root.txt`, `/sub/a.txt`, `/sub/sub2/nested.txt`.
    pub fn seed_tree(&self) {
        self.add_file("/root.txt", b"root");
        self.add_dir("/sub");
        self.add_file("/sub/a.txt", b"a");
        self.add_dir("/sub/sub2");
        self.add_file("/sub/sub2/nested.txt", b"nested");
    }
}

fn tls_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

struct Conn {
    cwd: String,
    user: Option<String>,
    rename_from: Option<String>,
    passive: Option<TcpListener>,
    protect_data: bool,
}

async fn serve(
    tcp: TcpStream,
    state: Arc<Mutex<ServerState>>,
    acceptor: TlsAcceptor,
) -> io::Result<()> {
    let mut ctrl: BufReader<Box<dyn Io>> = BufReader::new(Box::new(tcp));
    reply(&mut ctrl, "220-Welcome to the mock server\r\n220 Ready\r\n").await?;

    let mut conn = Conn {
        cwd: "/".into(),
        user: None,
        rename_from: None,
        passive: None,
        protect_data: false,
    };

    loop {
        let mut line = String::new();
        if ctrl.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        with_state(&state, |fs| fs.commands.push(line.clone()));
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match verb.as_str() {
            "USER" if arg == "anonymous" => {
                reply(&mut ctrl, "230 Anonymous access granted\r\n").await?
            }
            "USER" => {
                conn.user = Some(arg);
                reply(&mut ctrl, "331 Password required\r\n").await?
            }
            "PASS" => {
                if conn.user.as_deref() == Some(USER) && arg == PASSWORD {
                    reply(&mut ctrl, "230 Logged in\r\n").await?
                } else {
                    reply(&mut ctrl, "530 Login incorrect.\r\n").await?
                }
            }
            "PWD" => {
                let quoted = conn.cwd.replace('"', "\"\"");
                reply(&mut ctrl, &format!("257 \"{}\" is current directory\r\n", quoted)).await?
            }
            "CWD" => {
                let target = resolve(&conn.cwd, &arg);
                if with_state(&state, |fs| fs.dirs.contains(&target)) {
                    conn.cwd = target;
                    reply(&mut ctrl, "250 Directory changed\r\n").await?
                } else {
                    reply(&mut ctrl, "550 No such directory\r\n").await?
                }
            }
            "MKD" => {
                let target = resolve(&conn.cwd, &arg);
                with_state(&state, |fs| fs.dirs.insert(target.clone()));
                reply(&mut ctrl, &format!("257 \"{}\" created\r\n", target)).await?
            }
            "DELE" => {
                let target = resolve(&conn.cwd, &arg);
                if with_state(&state, |fs| fs.files.remove(&target).is_some()) {
                    reply(&mut ctrl, "250 Deleted\r\n").await?
                } else {
                    reply(&mut ctrl, "550 No such file\r\n").await?
                }
            }
            "RNFR" => {
                let target = resolve(&conn.cwd, &arg);
                if with_state(&state, |fs| fs.files.contains_key(&target)) {
                    conn.rename_from = Some(target);
                    reply(&mut ctrl, "350 Ready for RNTO\r\n").await?
                } else {
                    reply(&mut ctrl, "550 No such file\r\n").await?
                }
            }
            "RNTO" => match conn.rename_from.take() {
                Some(from) => {
                    let to = resolve(&conn.cwd, &arg);
                    with_state(&state, |fs| {
                        if let Some(data) = fs.files.remove(&from) {
                            fs.files.insert(to, data);
                        }
                    });
                    reply(&mut ctrl, "250 Renamed\r\n").await?
                }
                None => reply(&mut ctrl, "503 RNFR first\r\n").await?,
            },
            "TYPE" => reply(&mut ctrl, &format!("200 Type set to {}\r\n", arg)).await?,
            "NOOP" => reply(&mut ctrl, "200 NOOP ok\r\n").await?,
            "FEAT" => {
                reply(
                    &mut ctrl,
                    "211-Features:\r\n MLST type*;size*;perm*;\r\n UTF8\r\n211 End\r\n",
                )
                .await?
            }
            "AUTH" => {
                reply(&mut ctrl, "234 Proceed with negotiation\r\n").await?;
                let raw = ctrl.into_inner();
                let tls = acceptor.accept(raw).await?;
                ctrl = BufReader::new(Box::new(tls));
            }
            "PBSZ" => reply(&mut ctrl, "200 PBSZ=0\r\n").await?,
            "PROT" => {
                conn.protect_data = arg.eq_ignore_ascii_case("P");
                reply(&mut ctrl, "200 Protection level set\r\n").await?
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                conn.passive = Some(listener);
                // Advertise an unroutable address; clients must dial the control host.
                reply(
                    &mut ctrl,
                    &format!(
                        "227 Entering Passive Mode (10,255,0,1,{},{}).\r\n",
                        port / 256,
                        port % 256
                    ),
                )
                .await?
            }
            "STOR" | "RETR" | "MLSD" => {
                let Some(listener) = conn.passive.take() else {
                    reply(&mut ctrl, "425 Use PASV first\r\n").await?;
                    continue;
                };
                let target = resolve(&conn.cwd, &arg);
                // Like real servers: refuse before touching the data socket,
                // and only start TLS on it after the 150.
                let payload = match verb.as_str() {
                    "STOR" => Some(Vec::new()),
                    "RETR" => with_state(&state, |fs| fs.files.get(&target).cloned()),
                    _ => with_state(&state, |fs| list_dir(fs, &target)).map(String::into_bytes),
                };
                let Some(payload) = payload else {
                    let missing = if verb == "RETR" { "file" } else { "directory" };
                    reply(&mut ctrl, &format!("550 No such {}\r\n", missing)).await?;
                    continue;
                };

                reply(&mut ctrl, "150 Opening data connection\r\n").await?;
                let (tcp, _) = listener.accept().await?;
                let mut data: Box<dyn Io> = if conn.protect_data {
                    Box::new(acceptor.accept(tcp).await?)
                } else {
                    Box::new(tcp)
                };
                with_state(&state, |fs| fs.data_tls.push(conn.protect_data));

                if verb == "STOR" {
                    let mut buf = Vec::new();
                    data.read_to_end(&mut buf).await?;
                    drop(data);
                    with_state(&state, |fs| fs.files.insert(target, buf));
                } else {
                    data.write_all(&payload).await?;
                    data.shutdown().await?;
                    drop(data);
                }
                reply(&mut ctrl, "226 Transfer complete\r\n").await?
            }
            "QUIT" => {
                reply(&mut ctrl, "221 Goodbye\r\n").await?;
                return Ok(());
            }
            _ => reply(&mut ctrl, "502 Command not implemented\r\n").await?,
        }
    }
}

/// Run `f` under the state lock. Keeping the guard inside a plain function
/// stops it from living across an `.await` in `serve`.
fn with_state<T>(state: &Mutex<ServerState>, f: impl FnOnce(&mut ServerState) -> T) -> T {
    f(&mut state.lock().unwrap())
}

async fn reply(ctrl: &mut BufReader<Box<dyn Io>>, text: &str) -> io::Result<()> {
    ctrl.write_all(text.as_bytes()).await?;
    ctrl.flush().await
}

fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else if cwd.ends_with('/') {
        format!("{}{}", cwd, arg)
    } else {
        format!("{}/{}", cwd, arg)
    };
    match joined.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// MLSD lines for `dir`, `.` and `..` first, then children by name.
fn list_dir(fs: &ServerState, dir: &str) -> Option<String> {
    if !fs.dirs.contains(dir) {
        return None;
    }
    let prefix = if dir == "/" { "/".to_string() } else { format!("{}/", dir) };
    let child = |path: &str| -> Option<String> {
        let rest = path.strip_prefix(&prefix)?;
        (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
    };

    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    for d in &fs.dirs {
        if let Some(name) = child(d) {
            entries.insert(name.clone(), format!("type=dir;perm=flcdmpe; {}\r\n", name));
        }
    }
    for (f, data) in &fs.files {
        if let Some(name) = child(f) {
            entries.insert(
                name.clone(),
                format!(
                    "type=file;size={};modify=20260101120000;perm=adfrw; {}\r\n",
                    data.len(),
                    name
                ),
            );
        }
    }

    let mut out = String::from("type=cdir;perm=el; .\r\ntype=pdir;perm=el; ..\r\n");
    out.push_str("type=dir;perm=el; .\r\ntype=dir;perm=el; ..\r\n");
    for line in entries.values() {
        out.push_str(line);
    }
    Some(out)
}

// ─── Scripted server ─────────────────────────────────────────────────

/// One action of a [`ScriptedServer`], played in order after the banner.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Read a command and answer it with the given text.
    Reply(&'static str),
    /// Read a command without answering.
    Read,
    /// Write text to the control connection without reading.
    Send(&'static str),
    /// Read AUTH, answer 234 and run the TLS handshake on the control connection.
    AuthTls,
    /// Read PASV and advertise a fresh listener.
    Pasv,
    /// Read PASV and advertise a port nothing listens on.
    PasvClosed,
    /// Accept the data connection as plain TCP.
    Accept,
    /// Accept the data connection and run the TLS handshake on it.
    AcceptTls,
    /// Accept the data connection and abort it with a TCP reset.
    AcceptReset,
    /// Write bytes to the data connection, then shut down its write side.
    DataSend(&'static [u8]),
    /// Read the data connection until the client closes it.
    DataDrain,
    /// Close the data connection.
    DataClose,
    /// Close the control connection.
    Hangup,
    /// Read and log commands until the client disconnects.
    Hold,
}

/// A single-connection server that follows a script and logs what it saw.
///
/// The log holds every command read (`PASS` included) and data events such as
/// `data closed after 3 bytes`.
pub struct ScriptedServer {
    pub addr: SocketAddr,
    task: JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = tls_acceptor();
        let task = tokio::spawn(async move {
            let mut log = Vec::new();
            if let Err(e) = play(listener, script, acceptor, &mut log).await {
                log.push(format!("io error: {}", e));
            }
            log
        });
        Self { addr, task }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the script to end and return its log.
    pub async fn finish(self) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("scripted server did not finish")
            .unwrap()
    }
}

async fn play(
    listener: TcpListener,
    script: Vec<Step>,
    acceptor: TlsAcceptor,
    log: &mut Vec<String>,
) -> io::Result<()> {
    let (tcp, _) = listener.accept().await?;
    let mut ctrl: BufReader<Box<dyn Io>> = BufReader::new(Box::new(tcp));
    reply(&mut ctrl, "220 Scripted server ready\r\n").await?;

    let mut passive: Option<TcpListener> = None;
    let mut data: Option<Box<dyn Io>> = None;

    for step in script {
        match step {
            Step::Reply(text) => {
                if !next_command(&mut ctrl, log).await? {
                    return Ok(());
                }
                reply(&mut ctrl, text).await?;
            }
            Step::Read => {
                if !next_command(&mut ctrl, log).await? {
                    return Ok(());
                }
            }
            Step::Send(text) => reply(&mut ctrl, text).await?,
            Step::AuthTls => {
                if !next_command(&mut ctrl, log).await? {
                    return Ok(());
                }
                reply(&mut ctrl, "234 Proceed with negotiation\r\n").await?;
                let raw = ctrl.into_inner();
                ctrl = BufReader::new(Box::new(acceptor.accept(raw).await?));
            }
            Step::Pasv | Step::PasvClosed => {
                if !next_command(&mut ctrl, log).await? {
                    return Ok(());
                }
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                // A closed port must be gone before the client can dial it.
                match step {
                    Step::Pasv => passive = Some(listener),
                    _ => drop(listener),
                }
                let text = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                    port / 256,
                    port % 256
                );
                reply(&mut ctrl, &text).await?;
            }
            Step::Accept | Step::AcceptTls | Step::AcceptReset => {
                let listener = passive
                    .take()
                    .ok_or_else(|| io::Error::other("no PASV listener to accept on"))?;
                let (tcp, _) = listener.accept().await?;
                match step {
                    Step::AcceptTls => data = Some(Box::new(acceptor.accept(tcp).await?)),
                    Step::AcceptReset => {
                        reset_on_close(&tcp)?;
                        drop(tcp);
                        log.push("data reset".to_string());
                    }
                    _ => data = Some(Box::new(tcp)),
                }
            }
            Step::DataSend(bytes) => {
                let conn = data.as_mut().ok_or_else(|| io::Error::other("no data connection"))?;
                conn.write_all(bytes).await?;
                conn.shutdown().await?;
            }
            Step::DataDrain => {
                let conn = data.as_mut().ok_or_else(|| io::Error::other("no data connection"))?;
                let mut buf = Vec::new();
                conn.read_to_end(&mut buf).await?;
                log.push(format!("data closed after {} bytes", buf.len()));
            }
            Step::DataClose => data = None,
            Step::Hangup => return Ok(()),
            Step::Hold => while next_command(&mut ctrl, log).await? {},
        }
    }
    Ok(())
}

/// Read one command into `log`. `false` once the client has disconnected.
async fn next_command(ctrl: &mut BufReader<Box<dyn Io>>, log: &mut Vec<String>) -> io::Result<bool> {
    let mut line = String::new();
    if ctrl.read_line(&mut line).await? == 0 {
        return Ok(false);
    }
    log.push(line.trim_end().to_string());
    Ok(true)
}

/// Make dropping `tcp` send RST instead of FIN.
#[allow(deprecated)]
fn reset_on_close(tcp: &TcpStream) -> io::Result<()> {
    tcp.set_linger(Some(Duration::ZERO))
}
