//! Point-to-point links between two namespaces

use crate::error::{Error, Result};
use crate::manifest::{LinkConfig, LinkMode};
use crate::network::command::Runner;
use crate::network::link::{self, Link};
use crate::network::namespace::Namespace;
use crate::network::veth::VethPair;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A veth pair whose ends are wired into two namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectLink {
    pub name: String,
    pub veth_pair: VethPair,
    /// Set once both ends have been attached
    pub busy: bool,
}

impl DirectLink {
    /// Wire the left end into `namespaces[left]` and the right end into
    /// `namespaces[right]`, in that order
    ///
    /// If the right attach fails after the left one succeeded the link stays
    /// half-wired: the left end remains in its namespace and `busy` stays
    /// false. Nothing is rolled back.
    pub fn wire(
        &mut self,
        namespaces: &mut [Namespace],
        left: usize,
        right: usize,
        runner: &Runner,
    ) -> Result<()> {
        if self.busy {
            return Err(Error::LinkBusy(self.name.clone()));
        }

        namespaces[left].attach(&mut self.veth_pair.left, runner)?;
        namespaces[right].attach(&mut self.veth_pair.right, runner)?;

        self.busy = true;
        info!(
            link = %self.name,
            left = %namespaces[left].name,
            right = %namespaces[right].name,
            "wired direct link"
        );
        Ok(())
    }
}

impl Link for DirectLink {
    const MODE: LinkMode = LinkMode::DirectLink;

    fn init(config: &LinkConfig, runner: &Runner) -> Result<Self> {
        link::ensure_mode(config, Self::MODE)?;

        let mut veth_pair = VethPair::new(&config.name);
        veth_pair.create(runner)?;

        Ok(Self {
            name: config.name.clone(),
            veth_pair,
            busy: false,
        })
    }

    /// Only a wired link can be destroyed
    fn destroy(&mut self, runner: &Runner) -> Result<()> {
        if !self.busy {
            return Err(Error::LinkNotBusy(self.name.clone()));
        }

        self.veth_pair.destroy(runner)
    }

    fn discard(&mut self, runner: &Runner) -> Result<()> {
        if !self.veth_pair.active {
            return Ok(());
        }
        self.veth_pair.destroy(runner)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::NamespaceConfig;
    use crate::network::command::{IpCommand, Recorder};
    use crate::network::link::{cleanup_links, init_links};
    use crate::network::namespace::init_namespaces;

    fn setup(runner: &Runner) -> Vec<Namespace> {
        let configs = vec![
            NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
            NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
        ];
        init_namespaces(&configs, runner).unwrap()
    }

    #[test]
    fn test_init_rejects_other_mode() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);

        let err = DirectLink::init(&LinkConfig::new("br0", LinkMode::Bridge), &runner).unwrap_err();
        assert!(matches!(err, Error::InvalidLinkMode { .. }));
        assert!(recorder.issued().is_empty());
    }

    #[test]
    fn test_init_creates_pair() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);

        let link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();
        assert!(!link.busy);
        assert!(link.veth_pair.active);
        assert_eq!(link.veth_pair.name, "link0");
    }

    #[test]
    fn test_wire_marks_busy() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let mut namespaces = setup(&runner);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();

        link.wire(&mut namespaces, 0, 1, &runner).unwrap();

        assert!(link.busy);
        assert!(link.veth_pair.left.attached);
        assert!(link.veth_pair.right.attached);
        assert!(namespaces.iter().all(|ns| ns.devices[0].configured));

        let moves: Vec<_> = recorder
            .issued()
            .into_iter()
            .filter_map(|c| match c {
                IpCommand::LinkSetNetns { device, namespace } => Some((device, namespace)),
                _ => None,
            })
            .collect();
        assert_eq!(
            moves,
            vec![
                ("link0-left".to_string(), "ns-a".to_string()),
                ("link0-right".to_string(), "ns-b".to_string()),
            ]
        );
    }

    #[test]
    fn test_wire_twice_fails() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let mut namespaces = setup(&runner);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();

        link.wire(&mut namespaces, 0, 1, &runner).unwrap();
        let err = link.wire(&mut namespaces, 0, 1, &runner).unwrap_err();
        assert!(matches!(err, Error::LinkBusy(_)));
    }

    #[test]
    fn test_right_attach_failure_leaves_half_wired() {
        let recorder = Recorder::new();
        recorder.fail_on(IpCommand::LinkSetNetns {
            device: "link0-right".into(),
            namespace: "ns-b".into(),
        });
        let runner = Runner::new(&recorder, false);
        let mut namespaces = setup(&runner);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();

        assert!(link.wire(&mut namespaces, 0, 1, &runner).is_err());

        assert!(!link.busy);
        assert!(link.veth_pair.left.attached);
        assert!(!link.veth_pair.right.attached);
        assert!(namespaces[0].devices[0].configured);
        assert!(!namespaces[1].devices[0].configured);
        // Not busy, so it cannot be destroyed as a link
        assert!(matches!(link.destroy(&runner), Err(Error::LinkNotBusy(_))));
    }

    #[test]
    fn test_destroy_requires_busy() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();

        let err = link.destroy(&runner).unwrap_err();
        assert!(matches!(err, Error::LinkNotBusy(_)));
        assert!(link.veth_pair.active);
    }

    #[test]
    fn test_destroy_wired_link_is_host_noop() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let mut namespaces = setup(&runner);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();
        link.wire(&mut namespaces, 0, 1, &runner).unwrap();
        recorder.clear();

        link.destroy(&runner).unwrap();
        assert!(recorder.issued().is_empty());
        assert!(link.veth_pair.active);
    }

    #[test]
    fn test_discard_unwired_link_removes_pair() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let mut link =
            DirectLink::init(&LinkConfig::new("link0", LinkMode::DirectLink), &runner).unwrap();

        link.discard(&runner).unwrap();
        assert!(!link.veth_pair.active);
        assert_eq!(
            recorder.issued().last(),
            Some(&IpCommand::LinkDelete {
                name: "link0-left".into()
            })
        );

        // Already gone
        link.discard(&runner).unwrap();
    }

    #[test]
    fn test_init_links_skips_failures_and_other_modes() {
        let recorder = Recorder::new();
        recorder.fail_on(IpCommand::VethAdd {
            left: "link1-left".into(),
            right: "link1-right".into(),
        });
        let runner = Runner::new(&recorder, false);
        let configs = vec![
            LinkConfig::new("link0", LinkMode::DirectLink),
            LinkConfig::new("br0", LinkMode::Bridge),
            LinkConfig::new("link1", LinkMode::DirectLink),
            LinkConfig::new("link2", LinkMode::DirectLink),
        ];

        let links: Vec<DirectLink> = init_links(&configs, &runner);
        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["link0", "link2"]);
    }

    #[test]
    fn test_cleanup_links_attempts_every_link() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let configs = vec![
            LinkConfig::new("link0", LinkMode::DirectLink),
            LinkConfig::new("link1", LinkMode::DirectLink),
            LinkConfig::new("link2", LinkMode::DirectLink),
        ];
        let mut links: Vec<DirectLink> = init_links(&configs, &runner);
        links[1].busy = true;
        links[2].busy = true;
        links[1].veth_pair.active = false;

        let err = cleanup_links(&mut links, &runner).unwrap_err();
        match err {
            Error::Aggregate(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected aggregate error, got {other:?}"),
        }
        // link2 was still torn down
        assert!(!links[2].veth_pair.active);
    }
}
