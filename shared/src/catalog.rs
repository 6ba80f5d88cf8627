/// Model catalog: maps a link type and model identifier to the ordered list
/// of files to download.
///
/// Public models are Falcon checkpoints on Hugging Face. Private models are
/// Llama 2 checkpoints served by a self-hosted download server.
use crate::errors::ResolveError;
use crate::models::LinkType;

/// Default host for public links.
pub const PUBLIC_BASE_URL: &str = "https://huggingface.co";

/// Files fetched from the `raw/main` tree of every Falcon repository.
const FALCON_COMMON_FILES: &[&str] = &[
    "config.json",
    "pytorch_model.bin.index.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "configuration_falcon.py",
    "generation_config.json",
    "modeling_falcon.py",
];

const PUBLIC_MODELS: &[&str] = &[
    "tiiuae/falcon-7b",
    "tiiuae/falcon-7b-instruct",
    "tiiuae/falcon-40b",
    "tiiuae/falcon-40b-instruct",
];

const PRIVATE_MODELS: &[&str] = &[
    "llama-2-7b",
    "llama-2-7b-chat",
    "llama-2-13b",
    "llama-2-13b-chat",
    "llama-2-70b",
    "llama-2-70b-chat",
];

/// Model identifiers known for a link type.
pub fn supported_models(link_type: LinkType) -> &'static [&'static str] {
    match link_type {
        LinkType::Public => PUBLIC_MODELS,
        LinkType::Private => PRIVATE_MODELS,
    }
}

/// Number of `pytorch_model-XXXXX-of-XXXXX.bin` shards for a Falcon model.
fn falcon_shard_count(model: &str) -> Option<u32> {
    match model {
        "tiiuae/falcon-7b" | "tiiuae/falcon-7b-instruct" => Some(2),
        "tiiuae/falcon-40b" | "tiiuae/falcon-40b-instruct" => Some(9),
        _ => None,
    }
}

/// Number of `consolidated.NN.pth` shards for a Llama 2 model.
fn llama_shard_count(model: &str) -> Option<u32> {
    match model {
        "llama-2-7b" | "llama-2-7b-chat" => Some(1),
        "llama-2-13b" | "llama-2-13b-chat" => Some(2),
        // Eight shards, 00 through 07; the checkpoint is unusable without 02.
        "llama-2-70b" | "llama-2-70b-chat" => Some(8),
        _ => None,
    }
}

/// Base URL of a private download server.
pub fn private_base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}/download/", host, port)
}

/// Weight shards first, then the common repository files.
pub fn public_urls(base: &str, model: &str) -> Result<Vec<String>, ResolveError> {
    let count = falcon_shard_count(model)
        .ok_or_else(|| ResolveError::UnknownPublicModel(model.to_string()))?;
    let base = base.trim_end_matches('/');

    let mut urls: Vec<String> = (1..=count)
        .map(|i| {
            format!(
                "{}/{}/resolve/main/pytorch_model-{:05}-of-{:05}.bin",
                base, model, i, count
            )
        })
        .collect();
    urls.extend(
        FALCON_COMMON_FILES
            .iter()
            .map(|file| format!("{}/{}/raw/main/{}", base, model, file)),
    );
    Ok(urls)
}

/// Consolidated checkpoints first, then `params.json`.
///
/// `base` is used verbatim and is expected to end with `/`.
pub fn private_urls(base: &str, model: &str) -> Result<Vec<String>, ResolveError> {
    let count = llama_shard_count(model)
        .ok_or_else(|| ResolveError::UnknownPrivateModel(model.to_string()))?;

    let mut urls: Vec<String> = (0..count)
        .map(|i| format!("{}{}/consolidated.{:02}.pth", base, model, i))
        .collect();
    urls.push(format!("{}{}/params.json", base, model));
    Ok(urls)
}

/// Resolve the ordered download URLs for a model.
///
/// For public links `base_url` overrides [`PUBLIC_BASE_URL`] when present.
/// For private links it is required.
pub fn resolve_urls(
    link_type: LinkType,
    model: &str,
    base_url: Option<&str>,
) -> Result<Vec<String>, ResolveError> {
    match link_type {
        LinkType::Public => public_urls(base_url.unwrap_or(PUBLIC_BASE_URL), model),
        LinkType::Private => {
            let base = base_url.ok_or(ResolveError::MissingBaseUrl)?;
            private_urls(base, model)
        }
    }
}

/// Local file name for a URL: its last path segment, query stripped.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let (_, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falcon_7b_urls() {
        let urls = resolve_urls(LinkType::Public, "tiiuae/falcon-7b", None).unwrap();
        assert_eq!(urls.len(), 2 + FALCON_COMMON_FILES.len());
        assert_eq!(
            urls[0],
            "https://huggingface.co/tiiuae/falcon-7b/resolve/main/pytorch_model-00001-of-00002.bin"
        );
        assert_eq!(
            urls[1],
            "https://huggingface.co/tiiuae/falcon-7b/resolve/main/pytorch_model-00002-of-00002.bin"
        );
        assert_eq!(urls[2], "https://huggingface.co/tiiuae/falcon-7b/raw/main/config.json");
        assert_eq!(
            urls.last().unwrap(),
            "https://huggingface.co/tiiuae/falcon-7b/raw/main/modeling_falcon.py"
        );
    }

    #[test]
    fn test_falcon_40b_instruct_has_nine_shards() {
        let urls = resolve_urls(LinkType::Public, "tiiuae/falcon-40b-instruct", None).unwrap();
        let shards: Vec<_> = urls.iter().filter(|u| u.contains("/resolve/main/")).collect();
        assert_eq!(shards.len(), 9);
        assert!(shards[8].ends_with("pytorch_model-00009-of-00009.bin"));
    }

    #[test]
    fn test_public_base_override_trims_slash() {
        let urls = resolve_urls(LinkType::Public, "tiiuae/falcon-7b", Some("http://127.0.0.1:9000/")).unwrap();
        assert!(urls[0].starts_with("http://127.0.0.1:9000/tiiuae/falcon-7b/resolve/main/"));
    }

    #[test]
    fn test_unknown_public_model() {
        let err = resolve_urls(LinkType::Public, "llama-2-7b", None).unwrap_err();
        assert_eq!(err, ResolveError::UnknownPublicModel("llama-2-7b".into()));
    }

    #[test]
    fn test_llama_13b_urls() {
        let base = private_base_url("10.0.0.5", 8080);
        let urls = resolve_urls(LinkType::Private, "llama-2-13b-chat", Some(base.as_str())).unwrap();
        assert_eq!(
            urls,
            vec![
                "http://10.0.0.5:8080/download/llama-2-13b-chat/consolidated.00.pth",
                "http://10.0.0.5:8080/download/llama-2-13b-chat/consolidated.01.pth",
                "http://10.0.0.5:8080/download/llama-2-13b-chat/params.json",
            ]
        );
    }

    #[test]
    fn test_llama_70b_has_every_shard() {
        let urls = private_urls("http://h:1/download/", "llama-2-70b").unwrap();
        assert_eq!(urls.len(), 9);
        for i in 0..8 {
            assert!(urls.contains(&format!("http://h:1/download/llama-2-70b/consolidated.{:02}.pth", i)));
        }
        assert!(urls[8].ends_with("/params.json"));
    }

    #[test]
    fn test_private_requires_base() {
        assert_eq!(
            resolve_urls(LinkType::Private, "llama-2-7b", None),
            Err(ResolveError::MissingBaseUrl)
        );
        assert_eq!(
            resolve_urls(LinkType::Private, "tiiuae/falcon-7b", Some("http://h:1/download/")),
            Err(ResolveError::UnknownPrivateModel("tiiuae/falcon-7b".into()))
        );
    }

    #[test]
    fn test_every_supported_model_resolves() {
        for model in supported_models(LinkType::Public) {
            assert!(resolve_urls(LinkType::Public, model, None).is_ok(), "{}", model);
        }
        for model in supported_models(LinkType::Private) {
            assert!(private_urls("http://h:1/download/", model).is_ok(), "{}", model);
        }
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://huggingface.co/tiiuae/falcon-7b/raw/main/tokenizer.json").as_deref(),
            Some("tokenizer.json")
        );
        assert_eq!(
            file_name_from_url("http://h:1/download/m/params.json?sig=abc").as_deref(),
            Some("params.json")
        );
        assert_eq!(file_name_from_url("http://h:1/download/"), None);
        assert_eq!(file_name_from_url("http://h:1"), None);
    }
}
