//! Command classification table
//!
//! Maps each logical command group to the raw command names (as they appear
//! in the store's per-command statistics) whose call counts it aggregates.
//! Groups overlap: a command may belong to several of them.

use std::sync::OnceLock;

/// A named bucket of related commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    /// Logical group name, e.g. `sorted-set`
    pub name: &'static str,
    /// Metric the group's summed call count is reported as
    pub metric: &'static str,
    /// Member commands, lower-case, no repeats
    pub commands: Vec<&'static str>,
}

impl CommandGroup {
    fn new(name: &'static str, metric: &'static str, commands: &[&'static str]) -> Self {
        let mut members: Vec<&'static str> = Vec::with_capacity(commands.len());
        for command in commands {
            if !members.contains(command) {
                members.push(*command);
            }
        }
        Self {
            name,
            metric,
            commands: members,
        }
    }

    pub fn contains(&self, command: &str) -> bool {
        self.commands.iter().any(|c| *c == command)
    }
}

const GET_TYPE: &[&str] = &[
    "get",
    "mget",
    "getrange",
    "strlen",
    "getbit",
    "bitcount",
    "bitpos",
    "hget",
    "hmget",
    "hgetall",
    "hkeys",
    "hvals",
    "hlen",
    "hexists",
    "hstrlen",
    "hscan",
    "lindex",
    "llen",
    "lrange",
    "scard",
    "sismember",
    "smembers",
    "srandmember",
    "sdiff",
    "sinter",
    "sunion",
    "sscan",
    "zcard",
    "zcount",
    "zlexcount",
    "zrange",
    "zrangebylex",
    "zrangebyscore",
    "zrank",
    "zrevrange",
    "zrevrangebylex",
    "zrevrangebyscore",
    "zrevrank",
    "zscore",
    "zscan",
    "pfcount",
    "exists",
    "ttl",
    "pttl",
    "type",
    "dump",
    "keys",
    "scan",
];

const SET_TYPE: &[&str] = &[
    "set",
    "setex",
    "psetex",
    "setnx",
    "setrange",
    "setbit",
    "mset",
    "msetnx",
    "append",
    "incr",
    "incrby",
    "incrbyfloat",
    "decr",
    "decrby",
    "getset",
    "bitop",
    "hset",
    "hmset",
    "hsetnx",
    "hdel",
    "hincrby",
    "hincrbyfloat",
    "lpush",
    "lpushx",
    "rpush",
    "rpushx",
    "linsert",
    "lset",
    "lrem",
    "ltrim",
    "lpop",
    "rpop",
    "rpoplpush",
    "blpop",
    "brpop",
    "brpoplpush",
    "sadd",
    "srem",
    "spop",
    "smove",
    "sdiffstore",
    "sinterstore",
    "sunionstore",
    "zadd",
    "zincrby",
    "zrem",
    "zremrangebylex",
    "zremrangebyrank",
    "zremrangebyscore",
    "zinterstore",
    "zunionstore",
    "pfadd",
    "pfmerge",
    "del",
    "unlink",
    "expire",
    "pexpire",
    "expireat",
    "pexpireat",
    "persist",
    "rename",
    "renamenx",
    "restore",
    "move",
];

const KEY_GENERIC: &[&str] = &[
    "del",
    "dump",
    "exists",
    "expire",
    "expireat",
    "keys",
    "move",
    "persist",
    "pexpire",
    "pexpireat",
    "pttl",
    "randomkey",
    "rename",
    "renamenx",
    "restore",
    "scan",
    "sort",
    "touch",
    "ttl",
    "type",
    "unlink",
];

const STRING: &[&str] = &[
    "append",
    "bitcount",
    "bitfield",
    "bitop",
    "bitpos",
    "decr",
    "decrby",
    "get",
    "getbit",
    "getrange",
    "getset",
    "incr",
    "incrby",
    "incrbyfloat",
    "mget",
    "mset",
    "msetnx",
    "psetex",
    "set",
    "setbit",
    "setex",
    "setnx",
    "setrange",
    "strlen",
];

const HASH: &[&str] = &[
    "hdel",
    "hexists",
    "hget",
    "hgetall",
    "hincrby",
    "hincrbyfloat",
    "hkeys",
    "hlen",
    "hmget",
    "hmset",
    "hscan",
    "hset",
    "hsetnx",
    "hstrlen",
    "hvals",
];

const LIST: &[&str] = &[
    "blpop",
    "brpop",
    "brpoplpush",
    "lindex",
    "linsert",
    "llen",
    "lpop",
    "lpush",
    "lpushx",
    "lrange",
    "lrem",
    "lset",
    "ltrim",
    "rpop",
    "rpoplpush",
    "rpush",
    "rpushx",
];

const SET: &[&str] = &[
    "sadd",
    "scard",
    "sdiff",
    "sdiffstore",
    "sinter",
    "sinterstore",
    "sismember",
    "smembers",
    "smove",
    "spop",
    "srandmember",
    "srem",
    "sscan",
    "sunion",
    "sunionstore",
];

const SORTED_SET: &[&str] = &[
    "bzpopmax",
    "bzpopmin",
    "zadd",
    "zcard",
    "zcount",
    "zincrby",
    "zinterstore",
    "zlexcount",
    "zpopmax",
    "zpopmin",
    "zrange",
    "zrangebylex",
    "zrangebyscore",
    "zrank",
    "zrem",
    "zremrangebylex",
    "zremrangebyrank",
    "zremrangebyscore",
    "zrevrange",
    "zrevrangebylex",
    "zrevrangebyscore",
    "zrevrank",
    "zscan",
    "zscore",
    "zunionstore",
];

const HYPERLOGLOG: &[&str] = &["pfadd", "pfcount", "pfmerge"];

const SCRIPT: &[&str] = &["eval", "evalsha", "script"];

static COMMAND_GROUPS: OnceLock<Vec<CommandGroup>> = OnceLock::new();

/// The classification table, built on first use and shared thereafter
pub fn command_groups() -> &'static [CommandGroup] {
    COMMAND_GROUPS.get_or_init(build_groups)
}

fn build_groups() -> Vec<CommandGroup> {
    // Key-based covers every command addressed by key, whatever its data type
    let key_based: Vec<&'static str> =
        [KEY_GENERIC, STRING, HASH, LIST, SET, SORTED_SET, HYPERLOGLOG].concat();

    vec![
        CommandGroup::new("get-type", "GetTypeCmds", GET_TYPE),
        CommandGroup::new("set-type", "SetTypeCmds", SET_TYPE),
        CommandGroup::new("key-based", "KeyBasedCmds", &key_based),
        CommandGroup::new("string", "StringBasedCmds", STRING),
        CommandGroup::new("hash", "HashBasedCmds", HASH),
        CommandGroup::new("list", "ListBasedCmds", LIST),
        CommandGroup::new("set", "SetBasedCmds", SET),
        CommandGroup::new("sorted-set", "SortedSetBasedCmds", SORTED_SET),
        CommandGroup::new("hyperloglog", "HyperLogLogBasedCmds", HYPERLOGLOG),
        CommandGroup::new("script", "EvalBasedCmds", SCRIPT),
    ]
}
