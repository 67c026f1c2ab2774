//! Service modules compiled into the binary.

use crate::model::ModuleDefinition;

pub fn definitions() -> Vec<ModuleDefinition> {
    vec![
        ModuleDefinition::new("barbican")
            .depends(&["keystone", "mysql", "rabbitmq"])
            .packages(&[
                "barbican-api",
                "barbican-keystone-listener",
                "barbican-worker",
            ])
            .tempest_packages(&["python3-barbican-tempest-plugin"])
            .logs(&["/var/log/barbican"])
            .test_include(&["barbican_tempest_plugin.tests.api"])
            .tempest_setting("service_available", "barbican", "true"),
        ModuleDefinition::new("ceph")
            .packages(&["ceph-mgr", "ceph-mon", "ceph-osd", "ceph-volume"])
            .logs(&["/var/log/ceph/"]),
        ModuleDefinition::new("cinder")
            .depends(&["ceph", "keystone", "mysql", "rabbitmq"])
            .packages(&["cinder-api", "cinder-scheduler", "cinder-volume"])
            .tempest_packages(&["python3-cinder-tempest-plugin"])
            .logs(&["/var/log/cinder/"]),
        ModuleDefinition::new("glance")
            .depends(&["keystone", "mysql"])
            .packages(&["glance-api"])
            .logs(&["/var/log/glance/"]),
        ModuleDefinition::new("heat")
            .depends(&["keystone", "mysql", "rabbitmq"])
            .packages(&["heat-api", "heat-api-cfn", "heat-engine"])
            .tempest_packages(&["python3-heat-tempest-plugin"])
            .logs(&["/var/log/heat/"])
            .test_include(&["heat_tempest_plugin.tests.api"])
            .tempest_setting("service_available", "heat_plugin", "true"),
        ModuleDefinition::new("keystone")
            .depends(&["mysql"])
            .packages(&["keystone", "apache2", "libapache2-mod-wsgi-py3"])
            .tempest_packages(&[
                "tempest",
                "python3-tempestconf",
                "python3-keystone-tempest-plugin",
            ])
            .logs(&["/var/log/keystone/"]),
        ModuleDefinition::new("magnum")
            .depends(&["heat", "keystone", "mysql", "rabbitmq"])
            .packages(&["magnum-api", "magnum-conductor"])
            .tempest_packages(&["python3-magnum-tempest-plugin"])
            .logs(&["/var/log/magnum/"])
            .test_include(&["magnum_tempest_plugin.tests.api"])
            .tempest_setting("service_available", "magnum", "true"),
        ModuleDefinition::new("mysql")
            .packages(&["mysql-server"])
            .logs(&["/var/log/mysql/"]),
        ModuleDefinition::new("neutron")
            .depends(&["keystone", "mysql", "ovn", "rabbitmq"])
            .packages(&["neutron-server", "neutron-ovn-metadata-agent"])
            .tempest_packages(&["python3-neutron-tempest-plugin"])
            .logs(&["/var/log/neutron/"]),
        ModuleDefinition::new("nova")
            .depends(&[
                "glance",
                "keystone",
                "mysql",
                "neutron",
                "ovn",
                "placement",
                "rabbitmq",
            ])
            .optional(&["ceph", "cinder"])
            .packages(&[
                "nova-api",
                "nova-conductor",
                "nova-scheduler",
                "nova-compute",
                "nova-spiceproxy",
                "spice-html5",
            ])
            .logs(&["/var/log/nova/"]),
        ModuleDefinition::new("ovn")
            .packages(&["ovn-central", "openvswitch-switch", "ovn-host"])
            .logs(&["/var/log/ovn/"]),
        ModuleDefinition::new("placement")
            .depends(&["keystone", "mysql"])
            .packages(&["placement-api"])
            .logs(&["/var/log/placement/"]),
        ModuleDefinition::new("rabbitmq")
            .packages(&["rabbitmq-server"])
            .logs(&["/var/log/rabbitmq/"]),
        ModuleDefinition::new("utils")
            .packages(&["crudini"])
            .logs(&["/var/log/apache2/"]),
    ]
}
