//! Unit tests for the repository write path, compensation included

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::dns::conf_store::ConfStore;
    use crate::dns::context::TenantMode;
    use crate::dns::corefile::{CorefileGenerator, DEFAULT_FORWARD};
    use crate::dns::domain::Domain;
    use crate::dns::errors::ErrorKind;
    use crate::dns::filesystem::{Filesystem, MemoryFilesystem};
    use crate::dns::host::Host;
    use crate::dns::identifiers::Uuid;
    use crate::dns::repository::ConfRepository;

    const CONF_PATH: &str = "/etc/coredns/Corefile";

    const EMPTY_COREFILE: &str = ". {\n    forward . 8.8.8.8\n}";

    const HOGE_COREFILE: &str = "hogehoge.hoge. {
    hosts hogehoge.hoge
    reload 10s 5s
    log
}

. {
    forward . 8.8.8.8
}";

    /// In-memory filesystem that fails writes or deletes on chosen paths
    #[derive(Default)]
    struct FailingFilesystem {
        inner: MemoryFilesystem,
        failing_writes: Mutex<HashSet<PathBuf>>,
        failing_deletes: Mutex<HashSet<PathBuf>>,
    }

    impl FailingFilesystem {
        fn fail_writes_to(&self, path: &str) {
            self.failing_writes.lock().insert(PathBuf::from(path));
        }

        fn fail_deletes_of(&self, path: &str) {
            self.failing_deletes.lock().insert(PathBuf::from(path));
        }

        fn heal(&self) {
            self.failing_writes.lock().clear();
            self.failing_deletes.lock().clear();
        }

        fn text(&self, path: &str) -> Option<String> {
            self.inner.load_text_file(Path::new(path)).ok()
        }
    }

    fn injected(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("injected failure: {}", path.display()))
    }

    impl Filesystem for FailingFilesystem {
        fn load_text_file(&self, path: &Path) -> io::Result<String> {
            self.inner.load_text_file(path)
        }

        fn write_text_file(&self, path: &Path, text: &str) -> io::Result<()> {
            if self.failing_writes.lock().contains(path) {
                return Err(injected(path));
            }
            self.inner.write_text_file(path, text)
        }

        fn delete_file(&self, path: &Path) -> io::Result<()> {
            if self.failing_deletes.lock().contains(path) {
                return Err(injected(path));
            }
            self.inner.delete_file(path)
        }

        fn list_filenames(&self, directory: &Path) -> io::Result<Vec<String>> {
            self.inner.list_filenames(directory)
        }
    }

    fn create_test_repository(mode: TenantMode) -> (ConfRepository, Arc<FailingFilesystem>) {
        let fs = Arc::new(FailingFilesystem::default());
        let generator = CorefileGenerator::new(Path::new(""), DEFAULT_FORWARD).unwrap();
        let store = Arc::new(ConfStore::new(generator, Path::new(CONF_PATH)));
        (ConfRepository::new(store, fs.clone(), mode), fs)
    }

    fn uuid(value: &str) -> Uuid {
        Uuid::new(value).unwrap()
    }

    #[test]
    fn test_create_domain_persists_zone_and_corefile() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);

        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let zone = fs.text("hogehoge.hoge").unwrap();
        assert_eq!(zone, format!("# DomainUUID: {}\n# Tenats:\n#   - t1\n", domain.uuid));
        assert_eq!(fs.text(CONF_PATH).unwrap(), HOGE_COREFILE);
        assert_eq!(repo.get_domain(&domain.uuid, Some(&uuid("t1"))).unwrap(), domain);
    }

    #[test]
    fn test_create_domain_tenant_modes() {
        let no_tenants: [&str; 0] = [];

        let (scoped, _) = create_test_repository(TenantMode::Scoped);
        let err = scoped.create_domain("hogehoge.hoge", &no_tenants).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let (legacy, fs) = create_test_repository(TenantMode::Legacy);
        let domain = legacy.create_domain("hogehoge.hoge", &no_tenants).unwrap();
        assert!(domain.tenants.is_empty());
        assert_eq!(
            fs.text("hogehoge.hoge").unwrap(),
            format!("# DomainUUID: {}\n# Tenats:\n", domain.uuid)
        );
    }

    #[test]
    fn test_create_duplicate_domain() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let first = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let err = repo.create_domain("hogehoge.hoge", &["t2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicated);
        assert!(fs.text("hogehoge.hoge").unwrap().contains(first.uuid.as_str()));
    }

    #[test]
    fn test_create_domain_rejects_tenant_line_breaks() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);

        let err = repo
            .create_domain("hogehoge.hoge", &["t1\n10.9.9.9  evil.hogehoge.hoge  # x"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(fs.text("hogehoge.hoge").is_none());
        assert!(fs.text(CONF_PATH).is_none());

        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let err = repo.update_tenants(&domain.uuid, None, &[" t1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(repo.get_domain(&domain.uuid, None).unwrap().tenants, vec![uuid("t1")]);
    }

    #[test]
    fn test_add_domain_rejects_uuid_of_another_domain() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let hoge = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let mut fuga = Domain::new_empty(hoge.uuid.clone(), "fugafuga.fuga").unwrap();
        fuga.tenants = vec![uuid("t2")];
        let err = repo.add_domain(fuga).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicated);
        assert!(fs.text("fugafuga.fuga").is_none());
        assert_eq!(fs.text(CONF_PATH).unwrap(), HOGE_COREFILE);
        assert_eq!(repo.list_domains(None), vec![hoge.clone()]);

        // Same name and uuid replaces the cached domain
        let mut replacement = hoge.clone();
        replacement.tenants = vec![uuid("t3")];
        repo.add_domain(replacement.clone()).unwrap();
        assert_eq!(repo.get_domain(&hoge.uuid, None).unwrap(), replacement);
    }

    #[test]
    fn test_get_domain_enforces_tenant() {
        let (repo, _) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let err = repo.get_domain(&domain.uuid, Some(&uuid("t2"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(repo.get_domain(&domain.uuid, None).is_ok());

        let err = repo.get_domain(&uuid("missing"), Some(&uuid("t1"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_host_lifecycle() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let t1 = uuid("t1");

        let host = Host::new_original("hogeserver1.hogehoge.hoge", "172.21.1.1").unwrap();
        repo.add_host(&domain.uuid, Some(&t1), host.clone()).unwrap();
        assert!(fs
            .text("hogehoge.hoge")
            .unwrap()
            .ends_with(&format!("172.21.1.1  hogeserver1.hogehoge.hoge  # {}\n", host.uuid())));

        let fetched = repo.get_host(&domain.uuid, Some(&t1), host.uuid()).unwrap();
        assert_eq!(fetched, host);

        let updated = repo
            .update_host(&domain.uuid, Some(&t1), host.uuid(), None, Some("172.21.1.10"))
            .unwrap();
        assert_eq!(updated.name(), "hogeserver1.hogehoge.hoge");
        assert_eq!(updated.address(), "172.21.1.10");
        assert!(fs.text("hogehoge.hoge").unwrap().contains("172.21.1.10  hogeserver1"));

        let removed = repo.delete_host(&domain.uuid, Some(&t1), host.uuid()).unwrap();
        assert_eq!(removed, updated);
        assert!(repo.get_domain(&domain.uuid, None).unwrap().hosts.is_empty());

        let err = repo.delete_host(&domain.uuid, Some(&t1), host.uuid()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_host_leaves_disk_alone() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        repo.add_host(
            &domain.uuid,
            None,
            Host::new_original("hogeserver1.hogehoge.hoge", "172.21.1.1").unwrap(),
        )
        .unwrap();
        let zone = fs.text("hogehoge.hoge").unwrap();

        let err = repo
            .add_host(
                &domain.uuid,
                None,
                Host::new_original("hogeserver2.hogehoge.hoge", "172.21.1.1").unwrap(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Duplicated);
        assert_eq!(fs.text("hogehoge.hoge").unwrap(), zone);
        assert_eq!(repo.get_domain(&domain.uuid, None).unwrap().hosts.len(), 1);
    }

    #[test]
    fn test_host_operations_enforce_tenant() {
        let (repo, _) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let host = Host::new_original("hogeserver1.hogehoge.hoge", "172.21.1.1").unwrap();
        let err = repo.add_host(&domain.uuid, Some(&uuid("t2")), host).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_delete_domain() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let hoge = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let fuga = repo.create_domain("fugafuga.fuga", &["t1"]).unwrap();

        let removed = repo.delete_domain(&fuga.uuid, Some(&uuid("t1"))).unwrap();
        assert_eq!(removed, fuga);
        assert!(fs.text("fugafuga.fuga").is_none());
        assert_eq!(fs.text(CONF_PATH).unwrap(), HOGE_COREFILE);

        repo.delete_domain(&hoge.uuid, None).unwrap();
        assert_eq!(fs.text(CONF_PATH).unwrap(), EMPTY_COREFILE);
        assert!(repo.list_domains(None).is_empty());
    }

    #[test]
    fn test_update_tenants() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();

        let updated = repo
            .update_tenants(&domain.uuid, Some(&uuid("t1")), &["t2", "t3"])
            .unwrap();
        assert_eq!(updated.tenants, vec![uuid("t2"), uuid("t3")]);
        assert!(fs.text("hogehoge.hoge").unwrap().contains("#   - t3\n"));

        // t1 has lost access
        let err = repo
            .update_tenants(&domain.uuid, Some(&uuid("t1")), &["t1"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let empty: [&str; 0] = [];
        let err = repo.update_tenants(&domain.uuid, None, &empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_list_domains_and_tenants() {
        let (repo, _) = create_test_repository(TenantMode::Scoped);
        let hoge = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let fuga = repo.create_domain("fugafuga.fuga", &["t1", "t2"]).unwrap();

        let names: Vec<String> = repo
            .list_domains(None)
            .iter()
            .map(|d| d.name.to_string())
            .collect();
        assert_eq!(names, vec!["fugafuga.fuga", "hogehoge.hoge"]);
        assert_eq!(repo.list_domains(Some(&uuid("t2"))), vec![fuga.clone()]);

        let tenants = repo.list_tenants();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].tenant, uuid("t1"));

        let mut expected = vec![hoge.uuid.clone(), fuga.uuid.clone()];
        expected.sort();
        assert_eq!(tenants[0].domains, expected);
        assert_eq!(tenants[1].domains, vec![fuga.uuid]);
    }

    #[test]
    fn test_zone_write_failure_changes_nothing() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        fs.fail_writes_to("hogehoge.hoge");

        let err = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServerSide);
        assert!(repo.list_domains(None).is_empty());
        assert!(fs.text(CONF_PATH).is_none());
    }

    #[test]
    fn test_corefile_failure_removes_new_zone_file() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        fs.fail_writes_to(CONF_PATH);

        let err = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServerSide);
        assert!(fs.text("hogehoge.hoge").is_none());
        assert!(repo.list_domains(None).is_empty());
    }

    #[test]
    fn test_corefile_failure_restores_previous_zone_file() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let zone = fs.text("hogehoge.hoge").unwrap();
        let corefile = fs.text(CONF_PATH).unwrap();

        fs.fail_writes_to(CONF_PATH);
        let host = Host::new_original("hogeserver1.hogehoge.hoge", "172.21.1.1").unwrap();
        assert!(repo.add_host(&domain.uuid, None, host.clone()).is_err());

        assert_eq!(fs.text("hogehoge.hoge").unwrap(), zone);
        assert_eq!(fs.text(CONF_PATH).unwrap(), corefile);
        assert!(repo.get_domain(&domain.uuid, None).unwrap().hosts.is_empty());

        fs.heal();
        repo.add_host(&domain.uuid, None, host).unwrap();
        assert_ne!(fs.text("hogehoge.hoge").unwrap(), zone);
    }

    #[test]
    fn test_corefile_failure_restores_deleted_zone_file() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let domain = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        let zone = fs.text("hogehoge.hoge").unwrap();

        fs.fail_writes_to(CONF_PATH);
        assert!(repo.delete_domain(&domain.uuid, None).is_err());

        assert_eq!(fs.text("hogehoge.hoge").unwrap(), zone);
        assert_eq!(repo.get_domain(&domain.uuid, None).unwrap(), domain);
    }

    #[test]
    fn test_failed_compensation_is_unrecoverable() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        fs.fail_writes_to(CONF_PATH);
        fs.fail_deletes_of("hogehoge.hoge");

        let err = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unrecoverable);
        assert!(err.to_string().contains("compensation also failed"));
        // Disk is left inconsistent, the cache is not
        assert!(fs.text("hogehoge.hoge").is_some());
        assert!(repo.list_domains(None).is_empty());
    }

    #[test]
    fn test_load_domains_strict_and_lenient() {
        let fs = MemoryFilesystem::new();
        let hosts = Path::new("/hosts");
        fs.write_text_file(&hosts.join("good.example"), "# DomainUUID: d1\n# Tenats:\n#   - t1\n")
            .unwrap();
        fs.write_text_file(&hosts.join("bad.example"), "10.0.0.1  a.bad.example  # h1\n")
            .unwrap();

        let err = ConfRepository::load_domains(&fs, hosts, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerSide);

        let domains = ConfRepository::load_domains(&fs, hosts, false).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].name.as_str(), "good.example");
    }

    #[test]
    fn test_load_domains_rejects_reused_uuid() {
        let fs = MemoryFilesystem::new();
        let hosts = Path::new("/hosts");
        fs.write_text_file(&hosts.join("a.example"), "# DomainUUID: d1\n# Tenats:\n#   - t1\n")
            .unwrap();
        fs.write_text_file(&hosts.join("b.example"), "# DomainUUID: d1\n# Tenats:\n#   - t2\n")
            .unwrap();

        let err = ConfRepository::load_domains(&fs, hosts, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerSide);

        // Files are visited in name order, so the first one wins
        let domains = ConfRepository::load_domains(&fs, hosts, false).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].name.as_str(), "a.example");
        assert_eq!(domains[0].tenants, vec![uuid("t1")]);
    }

    #[test]
    fn test_load_domain_on_cache_miss() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        fs.write_text_file(
            Path::new("hogehoge.hoge"),
            "# DomainUUID: d1\n# Tenats:\n#   - t1\n172.21.1.1  hogeserver1.hogehoge.hoge  # h1\n",
        )
        .unwrap();

        let domain = repo.load_domain("hogehoge.hoge").unwrap();
        assert_eq!(domain.uuid, uuid("d1"));
        assert_eq!(domain.hosts.len(), 1);
        assert_eq!(fs.text(CONF_PATH).unwrap(), HOGE_COREFILE);

        // Served from the cache from now on
        fs.delete_file(Path::new("hogehoge.hoge")).unwrap();
        assert_eq!(repo.load_domain("hogehoge.hoge").unwrap(), domain);

        let err = repo.load_domain("missing.hoge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_load_domain_rejects_uuid_of_cached_domain() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        let hoge = repo.create_domain("hogehoge.hoge", &["t1"]).unwrap();
        fs.write_text_file(
            Path::new("fugafuga.fuga"),
            &format!("# DomainUUID: {}\n# Tenats:\n#   - t2\n", hoge.uuid),
        )
        .unwrap();

        let err = repo.load_domain("fugafuga.fuga").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicated);
        assert_eq!(repo.list_domains(None), vec![hoge.clone()]);
        assert_eq!(fs.text(CONF_PATH).unwrap(), HOGE_COREFILE);
        assert_eq!(repo.get_domain(&hoge.uuid, Some(&uuid("t1"))).unwrap(), hoge);
    }

    #[test]
    fn test_write_corefile() {
        let (repo, fs) = create_test_repository(TenantMode::Scoped);
        repo.write_corefile().unwrap();
        assert_eq!(fs.text(CONF_PATH).unwrap(), EMPTY_COREFILE);
        assert_eq!(repo.render_corefile().unwrap(), EMPTY_COREFILE);

        fs.fail_writes_to(CONF_PATH);
        assert!(repo.write_corefile().is_err());
    }
}
