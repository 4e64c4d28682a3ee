//! Built-in source and selector tables.

use ns_core::ContentLanguage;

use super::{SelectorDefinition, SourceDefinition};

const PD_RENMIN: &str = r#"div.fl a[href*="/n1/"]"#;
const PD_WORLD: &str = r#"div.ej_bor a[href*="/n1/"]"#;
const PD_SOC_ECO: &str = r#"div.ej_list_box a[href*="/n1/"]"#;
const THE_PAPER: &str = r#"div.small_toplink__GmZhY > a.index_inherit__A1ImK[target="_blank"]"#;
const GOV_NEWS: &str = "div.news_box a";
const GLOBAL_TIMES: &str = "a.new_title_ms,div.common_title a,a.new_title_ml";

/// (source, section, listing url, link selector, base url override)
const ZH_SOURCES: &[(&str, &str, &str, &str, Option<&str>)] = &[
    ("People's Daily", "人民网人事频道", "http://renshi.people.com.cn/", PD_RENMIN, None),
    ("People's Daily", "PD Anti Corruption", "http://fanfu.people.com.cn/", PD_RENMIN, None),
    ("People's Daily", "PD International Breaking News", "http://world.people.com.cn/GB/157278/index.html", PD_WORLD, None),
    ("People's Daily", "PD International In-depth", "http://world.people.com.cn/GB/14549/index.html", PD_WORLD, None),
    ("People's Daily", "PD Society", "http://society.people.com.cn/GB/136657/index.html", PD_SOC_ECO, None),
    ("People's Daily", "PD Economy", "http://finance.people.com.cn/GB/70846/index.html", PD_SOC_ECO, None),
    ("The Paper", "China Government", "https://www.thepaper.cn/list_25462", THE_PAPER, None),
    ("The Paper", "Personnel Trends", "https://www.thepaper.cn/list_25423", THE_PAPER, None),
    ("The Paper", "Tiger Hunt", "https://www.thepaper.cn/list_25490", THE_PAPER, None),
    ("The Paper", "Project No1", "https://www.thepaper.cn/list_25424", THE_PAPER, None),
    ("The Paper", "Zhongnanhai", "https://www.thepaper.cn/list_25488", THE_PAPER, None),
    ("The Paper", "Live on the scene", "https://www.thepaper.cn/list_25428", THE_PAPER, None),
    ("The Paper", "Exclusive Reports", "https://www.thepaper.cn/list_25427", THE_PAPER, None),
    ("The Paper", "Public Opinion", "https://www.thepaper.cn/list_25489", THE_PAPER, None),
    ("State Council", "News Releases", "https://www.gov.cn/lianbo/fabu/", GOV_NEWS, None),
    ("State Council", "Department News", "https://www.gov.cn/lianbo/bumen/", GOV_NEWS, None),
    ("State Council", "Local News", "https://www.gov.cn/lianbo/difang/", GOV_NEWS, None),
    ("State Council", "Government News Broadcast", "https://www.gov.cn/lianbo/", GOV_NEWS, None),
    ("State Council", "Breaking News", "https://www.gov.cn/toutiao/liebiao/", GOV_NEWS, None),
    ("State Council", "Latest Policies", "https://www.gov.cn/zhengce/zuixin/", GOV_NEWS, None),
    ("State Council", "Policy Interpretation", "https://www.gov.cn/zhengce/jiedu/", GOV_NEWS, None),
    ("State Council", "CAC", "https://www.cac.gov.cn/yaowen/wxyw/A093602index_1.htm", "div#loadingInfoPage a", Some("https://www.cac.gov.cn")),
    ("State Council", "MOFCOM Spokesperson", "https://www.mofcom.gov.cn/xwfb/xwfyrth/index.html", "ul.txtList_01 a", None),
    ("National Bureau of Statistics", "Data Release", "https://www.stats.gov.cn/sj/zxfb/", "a.pc1200", None),
    ("National Bureau of Statistics", "Data Interpretation", "https://www.stats.gov.cn/sj/sjjd/", "a.pc1200", None),
    ("National Bureau of Statistics", "Press Conference", "https://www.stats.gov.cn/sj/xwfbh/fbhwd/", "a.pc1200", None),
    ("Taiwan Affairs Office", "Press Releases", "http://www.gwytb.gov.cn/xwdt/xwfb/wyly/", "ul.scdList a", None),
    ("Taiwan Affairs Office", "Department News", "http://www.gwytb.gov.cn/bmst/", "ul.scdList a", None),
    ("Ministry of National Defense", "Regular PC", "http://www.mod.gov.cn/gfbw/xwfyr/lxjzh_246940/index.html", "li a", None),
    ("Ministry of National Defense", "Routine PC", "http://www.mod.gov.cn/gfbw/xwfyr/yzxwfb/index.html", "li a", None),
    ("Ministry of National Defense", "Special PC", "http://www.mod.gov.cn/gfbw/xwfyr/ztjzh/index.html", "li a", None),
    ("Guancha", "International", "https://www.guancha.cn/GuoJi%C2%B7ZhanLue/list_1.shtml", "h4.module-title a", None),
    ("Guancha", "Chinese Diplomacy", "https://www.guancha.cn/ZhongGuoWaiJiao/list_1.shtml", "h4.module-title a", None),
];

/// (section, path under https://www.globaltimes.cn/)
const GLOBAL_TIMES_SECTIONS: &[(&str, &str)] = &[
    ("Politics", "china/politics/index.html"),
    ("Society", "china/society/index.html"),
    ("Diplomacy", "china/diplomacy/index.html"),
    ("Military", "china/military/index.html"),
    ("Science", "china/science/index.html"),
    ("GT Voice", "source/gt-voice/index.html"),
    ("Insight", "source/insight/index.html"),
    ("Economy", "source/economy/index.html"),
    ("Comments", "source/comments/index.html"),
    ("Editorial", "opinion/editorial/index.html"),
    ("Observer", "opinion/observer/index.html"),
    ("Asian Review", "opinion/asian-review/index.html"),
    ("Top Talk", "opinion/top-talk/index.html"),
    ("Viewpoint", "opinion/viewpoint/index.html"),
    ("In-depth", "In-depth/index.html"),
];

pub fn sources() -> Vec<SourceDefinition> {
    let mut sources: Vec<SourceDefinition> = ZH_SOURCES
        .iter()
        .map(|&(source, section, listing_url, link_selector, base_url)| SourceDefinition {
            source: source.to_string(),
            section: section.to_string(),
            listing_url: listing_url.to_string(),
            link_selector: link_selector.to_string(),
            base_url: base_url.map(str::to_string),
            language: ContentLanguage::Zh,
        })
        .collect();

    sources.extend(GLOBAL_TIMES_SECTIONS.iter().map(|&(section, path)| SourceDefinition {
        source: "Global Times".to_string(),
        section: section.to_string(),
        listing_url: format!("https://www.globaltimes.cn/{}", path),
        link_selector: GLOBAL_TIMES.to_string(),
        base_url: None,
        language: ContentLanguage::En,
    }));

    sources
}

const STANDARD_REMOVE: &[&str] = &["script", "style", ".ad", ".advertisement"];

fn entry(domain: &str, subcategory: &str, content: &str, title: &str, extra_remove: &[&str]) -> SelectorDefinition {
    SelectorDefinition {
        domain: domain.to_string(),
        subcategory: subcategory.to_string(),
        content: content.to_string(),
        title: Some(title.to_string()),
        author: None,
        date: None,
        remove: STANDARD_REMOVE
            .iter()
            .chain(extra_remove)
            .map(|s| s.to_string())
            .collect(),
    }
}

fn with_byline(mut definition: SelectorDefinition) -> SelectorDefinition {
    definition.date = Some(".time, .date, .publish-time".to_string());
    definition.author = Some(".author, .source".to_string());
    definition
}

pub fn selectors() -> Vec<SelectorDefinition> {
    let pd_extra = &[".related-articles", ".comments", ".social-share"];
    let pd_news = &[".related-news", ".hot-news"];

    vec![
        with_byline(entry("renshi.people.com.cn", "default", "div.show_text p", "h1.title, h1", pd_extra)),
        with_byline(entry("fanfu.people.com.cn", "default", "div.show_text p", "h1.title, h1", pd_extra)),
        with_byline(entry("world.people.com.cn", "default", "div.rm_txt_con p", "h1.title, h1", pd_extra)),
        entry(
            "world.people.com.cn",
            "international",
            "div.rm_txt_con p",
            "h1.title",
            &["div.edit", "div.page_copyright"],
        ),
        entry("society.people.com.cn", "default", "div.rm_txt_con p", "h1.title, h1", pd_news),
        entry("finance.people.com.cn", "default", "div.rm_txt_con p", "h1.title, h1", pd_news),
        SelectorDefinition {
            remove: vec!["script".to_string(), "style".to_string(), ".ad".to_string()],
            ..entry(
                "politics.people.com.cn",
                "default",
                "div.rm_txt_con, div.show_text, div.article_content",
                "h1.title",
                &[],
            )
        },
        entry(
            "www.xinhuanet.com",
            "default",
            "div.article-content, div#detail, span.detail",
            "h1.title, h1",
            &[".share-box", ".related-articles"],
        ),
        entry(
            "news.cctv.com",
            "default",
            "div.cnt_bd, div.content_area",
            "h1.title, h1",
            &[".video-player", ".related-video"],
        ),
    ]
}

pub fn default_selector() -> SelectorDefinition {
    entry(
        "default",
        "default",
        "article, .article, .content, .post-content, .entry-content, main, #main",
        "h1, .title, .post-title, .entry-title",
        &["nav", "header", "footer", ".sidebar", ".comments", ".related", ".share", ".social"],
    )
}
