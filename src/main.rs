// MIT License
//
// Copyright (c) 2016 Alexander Thaller <alexander.thaller@trivago.com>
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

extern crate env_logger;
extern crate glob;
extern crate host;
extern crate loggerv;
extern crate regex;
extern crate serde;
extern crate serde_json;
extern crate time;

#[macro_use]
extern crate clap;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use clap::App;
use glob::glob;
use host::Host;
use host::Hstore;
use log::LogLevel;
use regex::Regex;
use std::collections::BTreeMap as Map;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

#[derive(Default, Debug, Serialize, Deserialize, Clone)]
struct Count {
    count: u32,
    name: String,
}

#[derive(Debug)]
struct Filter {
    name: String,
    package: String,
    image: String,
    hosttype: String,
    tags: Vec<String>,
    tags_mode: String,
    vars: Vec<String>,
    vars_mode: String,
}

impl Default for Filter {
    fn default() -> Filter {
        Filter {
            name: String::new(),
            package: String::new(),
            image: String::new(),
            hosttype: String::new(),
            tags: Vec::new(),
            tags_mode: String::new(),
            vars: Vec::new(),
            vars_mode: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Warning {
    noip: bool,
    nopackage: bool,
    noimage: bool,
    notype: bool,
    notags: bool,
    novars: bool,
}

fn main() {
    let yaml = load_yaml!("cli.yml");
    let app = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let matches = match app.subcommand.clone() {
        Some(subcommand) => subcommand.matches,
        None => app.clone(),
    };

    let loglevel: LogLevel = matches.value_of("log_level")
        .unwrap_or("warn")
        .parse()
        .unwrap_or(LogLevel::Warn);
    loggerv::init_with_level(loglevel).unwrap();

    debug!("starting");
    debug!("matches: {:#?}", matches);

    let folderpath = match matches.value_of("folder_hosts") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from("hosts"),
    };
    let folder = folderpath.as_path();
    debug!("folder: {:#?}", folder);

    let filter = Filter {
        name: String::from(matches.value_of("filter_name").unwrap_or(".*")),
        package: String::from(matches.value_of("filter_package").unwrap_or("")),
        image: String::from(matches.value_of("filter_image").unwrap_or("")),
        hosttype: String::from(matches.value_of("filter_type").unwrap_or("")),
        tags: values_t!(matches.values_of("filter_tags"), String).unwrap_or(Vec::new()),
        tags_mode: String::from(matches.value_of("filter_tags_mode").unwrap_or("all")),
        vars: values_t!(matches.values_of("filter_vars"), String).unwrap_or(Vec::new()),
        vars_mode: String::from(matches.value_of("filter_vars_mode").unwrap_or("all")),
    };

    let warning = Warning {
        noip: matches.value_of("warn_noip").unwrap_or("true").parse().unwrap_or(true),
        nopackage: matches.value_of("warn_nopackage").unwrap_or("true").parse().unwrap_or(true),
        noimage: matches.value_of("warn_noimage").unwrap_or("true").parse().unwrap_or(true),
        notype: matches.value_of("warn_notype").unwrap_or("true").parse().unwrap_or(true),
        notags: matches.value_of("warn_notags").unwrap_or("true").parse().unwrap_or(true),
        novars: matches.value_of("warn_novars").unwrap_or("true").parse().unwrap_or(true),
    };

    debug!("filter: {:#?}", filter);
    debug!("warning: {:#?}", warning);

    let hosts = parse_hosts_from_folder(folder);

    debug!("Hosts Length: {}", hosts.len());

    let name_regex = Regex::new(filter.name.as_str()).unwrap();

    let hosts: Map<_, _> = hosts.iter()
        .filter(|&(_, host)| filter_host(host, &filter))
        .filter(|&(name, _)| name_regex.is_match(name.as_str()))
        .collect();

    debug!("Filtered Hosts Length: {}", hosts.len());

    match app.subcommand.clone() {
        Some(command) => {
            match command.name.as_str() {
                "list" => {
                    let format = matches.value_of("output_format").unwrap_or("default");
                    match format {
                        "json" => {
                            let snapshots: Map<_, _> = hosts.iter()
                                .map(|(&name, &host)| (name, host.to_json()))
                                .collect();
                            println!("{}",
                                     serde_json::to_string(&snapshots)
                                         .expect("can not convert hosts to json for listing the \
                                                  hosts"))
                        }
                        _ => println!("{:#?}", hosts),
                    }
                }
                "vars" => render_vars(hosts),
                "inventory" => {
                    let prefix = matches.value_of("hosts_prefix").unwrap_or("");
                    render_inventory(hosts, prefix);
                }
                "aggregate" => {
                    match command.matches.subcommand {
                        Some(command) => {
                            match command.name.as_str() {
                                "tags" => aggregate_tags(hosts),
                                "vars" => aggregate_vars(hosts),
                                _ => unreachable!(),
                            }
                        }
                        None => aggregate(hosts),
                    }
                }
                "validate" => {
                    for host in hosts.values() {
                        warn_host(host, &warning)
                    }
                }
                _ => unreachable!(),
            }
        }
        None => println!("{:#?}", hosts),
    }
}

fn render_vars(hosts: Map<&String, &Host>) {
    let mut vars: Map<&String, Map<String, String>> = Map::default();

    for (name, host) in hosts {
        vars.insert(name, host.collapsed_vars());
    }

    println!("{}",
             serde_json::to_string(&vars).expect("can not convert collapsed vars to json"));
}

fn render_inventory(hosts: Map<&String, &Host>, prefix: &str) {
    let host_prefix = match prefix {
        "" => String::from(""),
        _ => String::from(prefix) + ".",
    };

    println!("# generated: {}", time::now().rfc3339());
    println!("# tory version: {}", crate_version!());
    println!("");

    println!("[hosts]");
    for (name, host) in hosts {
        let mut line = format!("{}{} ansible_ssh_host={}", host_prefix, name, host.ip.addr);

        for (key, value) in host.collapsed_vars() {
            // ip is already on the line and hostname is the line itself
            if key == "ip" || key == "hostname" {
                continue;
            }

            if value.is_empty() {
                continue;
            }

            line.push_str(format!(" {}={}", key, value).as_str());
        }

        println!("{}", line);
    }
}

fn aggregate(hosts: Map<&String, &Host>) {
    let snapshots: Map<_, _> = hosts.iter()
        .map(|(&name, &host)| (name, host.to_json()))
        .collect();

    println!("{}", serde_json::to_string(&snapshots).unwrap());
}

fn aggregate_tags(hosts: Map<&String, &Host>) {
    let mut agg: Map<String, u32> = Map::default();
    for host in hosts.values() {
        for (key, value) in &host.tags.map {
            *agg.entry(format!("{}={}", key, value.string)).or_insert(0) += 1;
            *agg.entry("_total".to_string()).or_insert(0) += 1;
        }
    }

    let mut vec: Vec<Count> = Vec::default();
    for (name, count) in agg {
        vec.push(Count {
            count: count,
            name: name,
        });
    }

    println!("{}", serde_json::to_string(&vec).unwrap());
}

fn aggregate_vars(hosts: Map<&String, &Host>) {
    let mut agg: Map<String, u32> = Map::default();
    for host in hosts.values() {
        for (key, value) in &host.vars.map {
            *agg.entry(format!("{}={}", key, value.string)).or_insert(0) += 1;
            *agg.entry("_total".to_string()).or_insert(0) += 1;
        }
    }

    let mut vec: Vec<Count> = Vec::default();
    for (name, count) in agg {
        vec.push(Count {
            count: count,
            name: name,
        });
    }

    println!("{}", serde_json::to_string(&vec).unwrap());
}

fn parse_hosts_from_folder(folder: &Path) -> Map<String, Host> {
    let mut hosts: Map<String, Host> = Map::new();

    let files = format!("{}/*.json", folder.display());
    for entry in glob(files.as_str()).expect("Failed to read glob pattern") {
        match entry {
            Ok(path) => {
                match File::open(path.as_path()) {
                    Ok(file) => {
                        match host::host_json_from_body(file) {
                            Ok(hj) => {
                                let host = hj.to_host();
                                hosts.insert(host.name.clone(), host);
                            }
                            Err(err) => {
                                warn!("can not parse host {:#?} from file: {}", path, err)
                            }
                        }
                    }
                    Err(err) => warn!("can not read file: {}", err),
                }
            }
            Err(err) => warn!("can not read path from glob: {}", err),
        }
    }

    hosts
}

fn filter_host(host: &Host, filter: &Filter) -> bool {
    let mut filters: Vec<bool> = vec![empty_or_matching(&host.package.string, &filter.package),
                                      empty_or_matching(&host.image.string, &filter.image),
                                      empty_or_matching(&host.hosttype.string, &filter.hosttype)];

    let tags = render_pairs(&host.tags);
    match filter.tags_mode.as_str() {
        "one" => filters.push(contains_one(&tags, &filter.tags)),
        _ => filters.push(contains_all(&tags, &filter.tags)),
    }

    let vars = render_pairs(&host.vars);
    match filter.vars_mode.as_str() {
        "one" => filters.push(contains_one(&vars, &filter.vars)),
        _ => filters.push(contains_all(&vars, &filter.vars)),
    }

    debug!("host filters: {:?}", filters);

    filters.iter()
        .fold(true, |acc, &x| acc && x)
}

fn render_pairs(attrs: &Hstore) -> Vec<String> {
    attrs.map
        .iter()
        .map(|(key, value)| format!("{}={}", key, value.string))
        .collect()
}

fn contains_one<T: std::cmp::PartialEq>(source: &Vec<T>, search: &Vec<T>) -> bool {
    if search.is_empty() {
        return true;
    }

    for entry in search {
        if source.contains(entry) {
            return true;
        }
    }

    false
}

fn contains_all<T: std::cmp::PartialEq>(source: &Vec<T>, search: &Vec<T>) -> bool {
    if search.is_empty() {
        return true;
    }

    let mut vec = Vec::new();
    for entry in search {
        if source.contains(entry) {
            vec.push(true);
        } else {
            vec.push(false);
        }
    }

    vec.iter()
        .fold(true, |acc, &x| acc && x)
}

fn empty_or_matching(value: &str, filter: &str) -> bool {
    if filter == "" {
        return true;
    }

    value == filter
}

fn warn_host(host: &Host, warning: &Warning) {
    if warning.noip && host.ip.addr.is_empty() {
        warn!("host {} has no ip", host)
    }

    if warning.nopackage && host.package.string.is_empty() {
        warn!("host {} has no package", host)
    }

    if warning.noimage && host.image.string.is_empty() {
        warn!("host {} has no image", host)
    }

    if warning.notype && host.hosttype.string.is_empty() {
        warn!("host {} has no type", host)
    }

    if warning.notags && host.tags.map.is_empty() {
        warn!("host {} has no tags", host)
    }

    if warning.novars && host.vars.map.is_empty() {
        warn!("host {} has no vars", host)
    }
}
