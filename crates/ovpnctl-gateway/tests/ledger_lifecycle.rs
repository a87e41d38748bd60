//! End-to-end client lifecycle against fake collaborators

use ovpnctl_gateway::requests::parse;
use ovpnctl_gateway::{
    ClientRequest, Gateway, GatewayError, GatewayResult, Issued, Layout, NameRequest, NetworkFacts,
    NetworkFactsProvider, PkiEngine, PkiStep, ServiceAction, ServiceController, SetupRequest,
};
use ovpnctl_settings::{SettingsStore, ToolsConfig};
use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Certificate authority that writes placeholder files the way easy-rsa lays them out
struct FakePki {
    dir: PathBuf,
    steps: RefCell<Vec<PkiStep>>,
    fail: Option<PkiStep>,
}

impl FakePki {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            steps: RefCell::new(Vec::new()),
            fail: None,
        }
    }

    fn failing(dir: &Path, step: PkiStep) -> Self {
        Self {
            fail: Some(step),
            ..Self::new(dir)
        }
    }

    fn touch(&self, rel: &str, content: &str) {
        let path = self.dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn steps(&self) -> Vec<PkiStep> {
        self.steps.borrow().clone()
    }
}

impl PkiEngine for FakePki {
    fn execute(&self, step: &PkiStep) -> GatewayResult<()> {
        self.steps.borrow_mut().push(step.clone());
        if self.fail.as_ref() == Some(step) {
            return Err(GatewayError::Pki {
                step: step.to_string(),
                detail: "exit status 1".into(),
            });
        }
        match step {
            PkiStep::InitPki => {
                let _ = fs::remove_dir_all(&self.dir);
                fs::create_dir_all(&self.dir).unwrap();
            }
            PkiStep::BuildCa => {
                self.touch("ca.crt", "CA CERT");
                self.touch("private/ca.key", "CA KEY");
            }
            PkiStep::BuildServer(name) | PkiStep::BuildClient(name) => {
                self.touch(&format!("issued/{}.crt", name), &format!("{} CERT", name));
                self.touch(&format!("private/{}.key", name), &format!("{} KEY", name));
                self.touch(&format!("reqs/{}.req", name), "REQ");
            }
            PkiStep::GenCrl => {
                return Err(GatewayError::Pki {
                    step: step.to_string(),
                    detail: "nothing revoked".into(),
                })
            }
            PkiStep::GenDh => self.touch("dh.pem", "DH"),
            PkiStep::Revoke(_) => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeServices {
    calls: RefCell<Vec<String>>,
}

impl ServiceController for FakeServices {
    fn available(&self) -> bool {
        true
    }

    fn apply(&self, action: ServiceAction, unit: &str) -> bool {
        self.calls.borrow_mut().push(format!("{} {}", action.verb(), unit));
        true
    }
}

struct FakeNetwork;

impl NetworkFactsProvider for FakeNetwork {
    fn interfaces(&self) -> Vec<String> {
        vec!["eth0".into(), "lo".into()]
    }

    fn facts(&self, _interface: &str, want_ipv6: bool) -> NetworkFacts {
        NetworkFacts {
            ipv4: "192.168.1.50".into(),
            netmask: "255.255.255.0".into(),
            ipv6: want_ipv6.then(|| "2001:db8::5".to_string()),
        }
    }
}

type TestGateway<'a> = Gateway<&'a FakePki, &'a FakeServices, FakeNetwork>;

fn gateway<'a>(layout: &Layout, pki: &'a FakePki, services: &'a FakeServices) -> TestGateway<'a> {
    Gateway::new(layout.clone(), ToolsConfig::default(), pki, services, FakeNetwork)
}

fn ready_gateway<'a>(layout: &Layout, pki: &'a FakePki, services: &'a FakeServices) -> TestGateway<'a> {
    let gw = gateway(layout, pki, services);
    gw.setup_cert().unwrap();
    gw
}

fn add(gw: &TestGateway<'_>, json: &str) -> GatewayResult<Issued> {
    gw.add(&parse::<ClientRequest>(json).unwrap())
}

fn del(gw: &TestGateway<'_>, name: &str) -> GatewayResult<ovpnctl_settings::Client> {
    gw.del(&NameRequest { name: name.into() })
}

#[test]
fn test_identity_initialization_steps() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    fs::create_dir_all(layout.hostname.parent().unwrap()).unwrap();
    fs::write(&layout.hostname, "gw01\n").unwrap();
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();

    let gw = gateway(&layout, &pki, &services);
    gw.setup_cert().unwrap();

    assert_eq!(
        pki.steps(),
        vec![
            PkiStep::InitPki,
            PkiStep::BuildCa,
            PkiStep::BuildServer("gw01".into()),
            PkiStep::GenCrl,
            PkiStep::GenDh,
        ]
    );
    assert!(layout.pki_dir.join("private/gw01.key").is_file());
}

#[test]
fn test_identity_initialization_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::failing(&layout.pki_dir, PkiStep::BuildCa);
    let services = FakeServices::default();

    let err = gateway(&layout, &pki, &services).setup_cert().unwrap_err();
    assert!(matches!(err, GatewayError::Pki { ref step, .. } if step == "build-ca"));
    assert!(!err.is_usage());
}

#[test]
fn test_client_commands_require_ready_pki() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = gateway(&layout, &pki, &services);

    assert!(matches!(add(&gw, r#"{"name": "laptop"}"#), Err(GatewayError::NotReady)));
    assert!(matches!(del(&gw, "laptop"), Err(GatewayError::NotReady)));
    assert!(pki.steps().is_empty());
}

#[test]
fn test_issue_is_idempotent_per_name() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);

    let first = add(&gw, r#"{"name": "laptop", "users": ["alice"]}"#).unwrap();
    let id = match first {
        Issued::Created(id) => id,
        other => panic!("expected a new identity, got {:?}", other),
    };
    let builds_before = pki.steps().len();

    let second = add(&gw, r#"{"name": "laptop", "users": ["alice", "bob"]}"#).unwrap();
    assert_eq!(second, Issued::Updated(id));
    assert_eq!(pki.steps().len(), builds_before);

    let clients = gw.list().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].user_list(), vec!["alice", "bob"]);

    // Absent users clear the list
    add(&gw, r#"{"name": "laptop"}"#).unwrap();
    assert!(gw.list().unwrap()[0].user_list().is_empty());
}

#[test]
fn test_failed_build_leaves_no_entry() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::failing(&layout.pki_dir, PkiStep::BuildClient("laptop".into()));
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);

    let err = add(&gw, r#"{"name": "laptop"}"#).unwrap_err();
    assert!(matches!(err, GatewayError::Pki { .. }));
    assert!(gw.list().unwrap().is_empty());
}

#[test]
fn test_list_two_clients_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);

    add(&gw, r#"{"name": "laptop"}"#).unwrap();
    add(&gw, r#"{"name": "phone", "users": "carol"}"#).unwrap();

    let json = serde_json::to_value(gw.list().unwrap()).unwrap();
    let mut entries = json.as_array().unwrap().clone();
    entries.sort_by_key(|e| e["name"].as_str().unwrap().to_string());
    assert_eq!(
        serde_json::Value::Array(entries),
        serde_json::json!([
            {"name": "laptop", "users": []},
            {"name": "phone", "users": ["carol"]}
        ])
    );
}

#[test]
fn test_revoke_unknown_name_leaves_ledger_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);
    add(&gw, r#"{"name": "laptop"}"#).unwrap();
    let before = fs::read_to_string(&layout.settings).unwrap();

    let err = del(&gw, "tablet").unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(ref n) if n == "tablet"));
    assert!(err.is_usage());
    assert_eq!(fs::read_to_string(&layout.settings).unwrap(), before);
}

#[test]
fn test_revoke_removes_exactly_one_entry_and_its_files() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);

    add(&gw, r#"{"name": "laptop"}"#).unwrap();
    let Issued::Created(phone_id) = add(&gw, r#"{"name": "phone"}"#).unwrap() else {
        panic!("phone should be new");
    };

    // gen-crl always fails in the fake; revoke must still complete
    let removed = del(&gw, "laptop").unwrap();
    assert_eq!(removed.name, "laptop");
    assert!(pki.steps().contains(&PkiStep::Revoke("laptop".into())));
    assert!(!layout.pki_dir.join("private/laptop.key").exists());
    assert!(!layout.pki_dir.join("issued/laptop.crt").exists());
    assert!(!layout.pki_dir.join("reqs/laptop.req").exists());
    assert!(layout.pki_dir.join("private/phone.key").exists());

    let clients = gw.list().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].id, phone_id);
    assert_ne!(clients[0].id, removed.id);

    // A second revoke of the same name is NotFound, not a crash
    assert!(matches!(del(&gw, "laptop"), Err(GatewayError::NotFound(_))));
}

#[test]
fn test_setup_cert_clears_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);
    add(&gw, r#"{"name": "laptop"}"#).unwrap();

    gw.setup_cert().unwrap();
    assert!(gw.list().unwrap().is_empty());
    let store = SettingsStore::open(&layout.settings).unwrap();
    assert!(store.settings().clients().is_empty());
}

#[test]
fn test_download_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    let gw = ready_gateway(&layout, &pki, &services);
    add(&gw, r#"{"name": "laptop"}"#).unwrap();

    let path = gw.download(&NameRequest { name: "laptop".into() }).unwrap();
    assert_eq!(path, layout.tmp_dir.join("laptop-client.zip"));

    let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "laptop-ca.crt",
            "laptop-client.conf",
            "laptop-client.crt",
            "laptop-client.key",
            "laptop-client.ovpn",
        ]
    );

    let mut ovpn = String::new();
    archive.by_name("laptop-client.ovpn").unwrap().read_to_string(&mut ovpn).unwrap();
    assert!(ovpn.starts_with("client\n"));
    assert!(ovpn.contains("<key>\nlaptop KEY\n</key>"));

    let mut conf = String::new();
    archive.by_name("laptop-client.conf").unwrap().read_to_string(&mut conf).unwrap();
    assert!(conf.contains("cert laptop-client.crt"));

    assert!(matches!(
        gw.download(&NameRequest { name: "tablet".into() }),
        Err(GatewayError::NotFound(_))
    ));
}

#[test]
fn test_setup_regenerates_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    fs::create_dir_all(layout.ipv4_forward.parent().unwrap()).unwrap();
    fs::create_dir_all(layout.ipv6_forward.parent().unwrap()).unwrap();
    let gw = gateway(&layout, &pki, &services);

    let request: SetupRequest = parse(
        r#"{"port": 1194, "protocol": "udp", "deviceovpn": "tun", "compression": true,
            "duplicate_cn": false, "client_to_client": false, "dns_server": "Quad9",
            "extra_options": ["tls-version-min 1.2"]}"#,
    )
    .unwrap();
    assert!(gw.setup(&request).unwrap());

    // PKI was missing, so identity initialization ran first
    assert_eq!(pki.steps()[0], PkiStep::InitPki);

    let conf = fs::read_to_string(&layout.server_conf).unwrap();
    let lines: Vec<&str> = conf.lines().collect();
    for expected in [
        "port 1194",
        "proto udp",
        "dev tun",
        "ifconfig-pool-persist ipp.txt",
        "persist-tun",
        "comp-lzo",
        ";client-to-client",
        "server-ipv6 fddd:1194:1194:1194::/64",
        "push \"route 192.168.1.0 255.255.255.0\"",
        "push \"dhcp-option DNS 9.9.9.9\"",
        "tls-version-min 1.2",
    ] {
        assert!(lines.contains(&expected), "missing {:?} in\n{}", expected, conf);
    }
    assert!(!lines.contains(&"duplicate-cn"));

    let unit = fs::read_to_string(&layout.firewall_unit).unwrap();
    assert!(unit.contains("ExecStart=/usr/sbin/ip6tables -I FORWARD -s fddd:1194:1194:1194::/64 -j ACCEPT"));
    assert_eq!(
        fs::read_to_string(&layout.sysctl_conf).unwrap(),
        "net.ipv4.ip_forward=1\nnet.ipv6.conf.all.forwarding=1\n"
    );
    assert_eq!(fs::read_to_string(&layout.ipv4_forward).unwrap(), "1");

    let calls = services.calls.borrow();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[0], "enable openvpn");
    assert_eq!(calls[5], "restart openvpn-iptables");

    let settings = gw.get().unwrap();
    assert_eq!(settings["dns_server"], serde_json::json!("Quad9"));
    assert_eq!(settings["extra_options"], serde_json::json!(["tls-version-min 1.2"]));
}

#[test]
fn test_getopt_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = FakePki::new(&layout.pki_dir);
    let services = FakeServices::default();
    fs::create_dir_all(layout.passwd.parent().unwrap()).unwrap();
    fs::write(&layout.passwd, "root:x:0:0::/root:/bin/sh\nalice:x:1000:1000::/home/alice:/bin/sh\n").unwrap();

    let catalog = gateway(&layout, &pki, &services).getopt().unwrap();
    let json = serde_json::to_value(&catalog).unwrap();
    assert_eq!(json["protocol"], serde_json::json!(["tcp", "udp"]));
    assert_eq!(json["device"], serde_json::json!(["tun", "tap"]));
    assert_eq!(json["DNS_server"][0], serde_json::json!("None"));
    assert_eq!(json["loglevel"][1], serde_json::json!("Normal usage output"));
    assert_eq!(json["gateway"], serde_json::json!(["eth0", "lo"]));
    assert_eq!(json["users"], serde_json::json!(["alice"]));
}

/// Records, for every step, whether another holder is shut out of the PKI lock
struct LockWatchingPki {
    inner: FakePki,
    lock: PathBuf,
    held: RefCell<Vec<bool>>,
    waiters: RefCell<Vec<std::thread::JoinHandle<()>>>,
}

impl PkiEngine for LockWatchingPki {
    fn execute(&self, step: &PkiStep) -> GatewayResult<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        let lock = self.lock.clone();
        self.waiters.borrow_mut().push(std::thread::spawn(move || {
            let _guard = ovpnctl_settings::FileLock::acquire(&lock).unwrap();
            let _ = tx.send(());
        }));
        let held = rx.recv_timeout(std::time::Duration::from_millis(100)).is_err();
        self.held.borrow_mut().push(held);
        self.inner.execute(step)
    }
}

#[test]
fn test_pki_mutations_hold_the_pki_lock() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let pki = LockWatchingPki {
        inner: FakePki::new(&layout.pki_dir),
        lock: layout.pki_lock(),
        held: RefCell::new(Vec::new()),
        waiters: RefCell::new(Vec::new()),
    };
    let services = FakeServices::default();
    let gw = Gateway::new(layout.clone(), ToolsConfig::default(), &pki, &services, FakeNetwork);

    gw.setup_cert().unwrap();
    gw.add(&parse::<ClientRequest>(r#"{"name": "laptop"}"#).unwrap()).unwrap();
    gw.del(&NameRequest { name: "laptop".into() }).unwrap();
    drop(gw);

    for waiter in pki.waiters.take() {
        waiter.join().unwrap();
    }
    let held = pki.held.take();
    assert!(held.len() >= 7, "only {} steps ran", held.len());
    assert!(held.iter().all(|h| *h));
    assert!(pki.inner.steps().contains(&PkiStep::Revoke("laptop".into())));
}
